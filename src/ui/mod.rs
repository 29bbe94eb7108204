use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::api::{ConfidenceScale, HistoryEntry, PredictionResult};
use crate::chat::{ChatMessage, Sender};
use crate::session::Session;

/// Print `label` and read one trimmed line from stdin.
/// A closed stdin is reported as `UnexpectedEof`.
pub fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    read_prompt_line(&mut io::stdin().lock())
}

fn read_prompt_line(reader: &mut impl BufRead) -> io::Result<String> {
    let mut input = String::new();
    if reader.read_line(&mut input)? == 0 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
    }

    Ok(input.trim().to_string())
}

pub fn is_end_of_input(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::UnexpectedEof
}

/// Display welcome message
pub fn display_welcome() {
    println!();
    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("║                         MedAssist                             ║");
    println!("║              Symptom Checker & Health Assistant               ║");
    println!("╠═══════════════════════════════════════════════════════════════╣");
    println!("║  Describe your symptoms and the prediction service will       ║");
    println!("║  suggest likely conditions, precautions and a doctor.         ║");
    println!("║                                                               ║");
    println!("║          WARNING: This is NOT a diagnosis tool.               ║");
    println!("║     Always consult a medical professional for proper          ║");
    println!("║     diagnosis and treatment.                                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn display_login_required() {
    println!("You are not signed in. Run `medassist login --email <email>` first.");
}

pub fn display_session(session: &Session) {
    println!(
        "Signed in as {} <{}> since {}",
        session.user.name,
        session.user.email,
        session.signed_in_at.format("%d %b %Y %H:%M")
    );
}

/// Intake instructions shown before the symptom loop
pub fn display_intake_help() {
    println!("\n═══════════════════════════════════════════════════════════════");
    println!("                      ADD YOUR SYMPTOMS");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  <symptom>     add a symptom");
    println!("  ?<partial>    look up matching symptoms");
    println!("  #<n>          take suggestion number n");
    println!("  -<symptom>    remove a symptom");
    println!("  (empty line)  done\n");
}

pub fn display_symptoms(symptoms: &[String]) {
    if symptoms.is_empty() {
        println!("  Symptoms: (none)");
    } else {
        println!("  Symptoms: {}", symptoms.join(", "));
    }
}

pub fn display_suggestions(suggestions: &[String]) {
    if suggestions.is_empty() {
        println!("  No suggestions.");
        return;
    }
    for (i, label) in suggestions.iter().enumerate() {
        println!("  #{} {}", i + 1, label);
    }
}

/// Spinner shown while a prediction is in flight
pub fn analyzing_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Analyzing symptoms...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub fn display_result(result: &PredictionResult, configured: ConfidenceScale) {
    let scale = result.scale_or(configured);

    println!("\n═══════════════════════════════════════════════════════════════");
    println!("                      DIAGNOSIS RESULTS");
    println!("═══════════════════════════════════════════════════════════════");
    println!("  {}", result.condition.headline());
    println!("  Recommended Doctor: {}", result.doctor);
    if let Some(note) = &result.risk_note {
        println!("  {}", note);
    }
    println!();

    if result.diseases.is_empty() {
        println!("  No prediction found.");
    }

    for (i, disease) in result.diseases.iter().enumerate() {
        println!("┌─────────────────────────────────────────────────────────────┐");
        println!("│ #{}. {} ", i + 1, disease.disease);
        println!("│    Confidence: {}", scale.format(disease.confidence));
        println!("└─────────────────────────────────────────────────────────────┘");

        if !disease.description.is_empty() {
            println!("   {}", disease.description);
        }
        for precaution in &disease.precautions {
            println!("   • {}", precaution);
        }
        println!();
    }

    println!("═══════════════════════════════════════════════════════════════");
    println!("    This is NOT a diagnosis. Consult a medical professional.");
    println!("═══════════════════════════════════════════════════════════════\n");
}

pub fn display_history(history: &[HistoryEntry]) {
    println!("\n═══════════════════════════════════════════════════════════════");
    println!("                       PATIENT HISTORY");
    println!("═══════════════════════════════════════════════════════════════");

    if history.is_empty() {
        println!("  No history yet. Save a diagnosis to see it here.\n");
        return;
    }

    for entry in history {
        println!("  {}", entry.date);
        println!("    {} → {}", entry.symptoms, entry.disease);
        println!("    {}% • {} • {}\n", entry.confidence, entry.condition, entry.doctor);
    }
}

pub fn display_chat_message(message: &ChatMessage) {
    match message.from {
        Sender::Bot => println!("bot › {}", message.text),
        Sender::User => println!("you › {}", message.text),
    }
    if let Some(options) = &message.options {
        for (i, option) in options.iter().enumerate() {
            println!("        [{}] {}", i + 1, option);
        }
    }
}

/// Ask a yes/no question; anything but y/yes is a no.
pub fn ask_yes_no(question: &str) -> io::Result<bool> {
    let input = prompt(&format!("{} (y/n) ", question))?.to_lowercase();
    Ok(input == "y" || input == "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn closed_input_is_end_of_input() {
        let err = read_prompt_line(&mut Cursor::new("")).unwrap_err();
        assert!(is_end_of_input(&err));
    }

    #[test]
    fn blank_line_is_not_end_of_input() {
        let mut input = Cursor::new("  cough \n\n");
        assert_eq!(read_prompt_line(&mut input).unwrap(), "cough");
        assert_eq!(read_prompt_line(&mut input).unwrap(), "");
        assert!(is_end_of_input(&read_prompt_line(&mut input).unwrap_err()));
    }
}
