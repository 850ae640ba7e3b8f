use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use console::Term;
use dialoguer::Input;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

// Reads one line from the terminal, empty answers allowed.
// Piped stdin has no terminal to drive, so it is read line by line instead.
pub fn prompt_input(prompt: &str) -> Result<String> {
    if !io::stdin().is_terminal() || !Term::stderr().is_term() {
        eprint!("{}: ", prompt);
        io::stderr().flush().ok();
        return read_answer(&mut io::stdin().lock());
    }

    let input = Input::<String>::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()
        .context("Failed to read answer")?;

    Ok(input)
}

/// One answer line without its line ending. End of input reads as an empty answer.
pub fn read_answer(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line).context("Failed to read answer")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

// Spinner shown while a download job runs
pub fn job_spinner(progress: &MultiProgress, message: String) -> ProgressBar {
    let spinner = progress.add(ProgressBar::new_spinner());
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}
