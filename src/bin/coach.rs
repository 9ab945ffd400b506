use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use exam_coach::backend::GenerativeBackend;
use exam_coach::clients::gemini::GeminiBackend;
use exam_coach::clients::mock::{MockBackend, MockHandle};
use exam_coach::coach::StudyCoach;
use exam_coach::export::HISTORY_FILENAME;
use exam_coach::pipeline::UploadedFile;
use exam_coach::session::{Feedback, SessionPhase};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "coach", about = "Generate exam questions from a study document and get AI feedback on your answers")]
struct Args {
    /// Document to study (text, markdown, PNG, JPEG, or PDF)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Grade level the questions should target, e.g. "Zonal Inspector"
    #[arg(long)]
    grade: Option<String>,

    /// Backend to use: gemini or mock (no API calls)
    #[arg(long, default_value = "gemini")]
    backend: String,

    /// Directory the exported history is written to
    #[arg(long, default_value = ".")]
    export_dir: PathBuf,
}

fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Read answer lines until a lone "." line.
fn prompt_answer() -> anyhow::Result<String> {
    println!("Type your answer; finish with a single '.' on its own line:");
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches('\n');
        if line == "." {
            break;
        }
        lines.push(line.to_string());
    }
    Ok(lines.join("\n"))
}

fn print_feedback(feedback: &Feedback) {
    println!();
    println!("Score: {}%", feedback.confidence);
    println!("Assessment: {}", feedback.assessment);
    println!();
    println!("Comparison: {}", feedback.comparison);
    println!();
    println!("Suggested answer #1: {}", feedback.suggestion1);
    println!("Suggested answer #2: {}", feedback.suggestion2);
    if !feedback.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &feedback.sources {
            println!("  - {} <{}>", source.title, source.uri);
        }
    }
    println!();
}

const CREDENTIAL_BANNER: &str = "\
============================================================\n\
  API credential is invalid or missing.\n\
  Set GEMINI_API_KEY in the environment or a .env file,\n\
  then run coach again.\n\
============================================================";

/// Scripted replies so a mock run can walk the whole flow offline.
fn script_upload_replies(handle: &MockHandle, file: &UploadedFile) {
    if !file.media_type.starts_with("text/") && !file.name.ends_with(".md") {
        handle.add_text("Mock extracted body text for an offline demo run.");
    }
    handle.add_text(r#"{"category": "STUDY_MATERIAL"}"#);
    handle.add_text(
        serde_json::json!({
            "questions": [
                "Mention five (5) rights and privileges of a corps member during the service year.",
                "Differentiate between Secondment and Transfer of Service.",
                "Mention ten (10) Collaborating agencies during orientation course.",
                "Outline five (5) objectives of the NYSC scheme.",
                "Enumerate five (5) steps in embarking on a CDS project.",
                "Mention five (5) measures to control rejection of corps members.",
                "Outline five (5) conditions for relocation on health grounds."
            ]
        })
        .to_string(),
    );
}

fn script_evaluation_reply(handle: &MockHandle) {
    handle.add_text(
        serde_json::json!({
            "confidence": 72,
            "assessment": "A fair attempt covering some of the expected points.",
            "comparison": "The answer touches the main idea but misses several specifics.",
            "suggestion1": "A concise model answer listing the expected points in order.",
            "suggestion2": "An alternative answer framing the same points around practical duty."
        })
        .to_string(),
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let (backend, mock_handle): (Box<dyn GenerativeBackend>, Option<Arc<MockHandle>>) =
        match args.backend.to_lowercase().as_str() {
            "gemini" => (Box::new(GeminiBackend::from_env()), None),
            "mock" => {
                let (backend, handle) = MockBackend::new();
                (Box::new(backend), Some(handle))
            }
            other => bail!("Unknown backend: '{other}'. Supported: gemini, mock"),
        };

    let mut coach = StudyCoach::new(backend);
    // Command-line grade/file feed the first attempt only; every retry and
    // restart is a fresh user action at the prompt.
    let mut use_args = true;

    'session: loop {
        let grade = match args.grade.clone().filter(|_| use_args) {
            Some(grade) => grade,
            None => prompt("Grade level (e.g. Zonal Inspector)")?,
        };
        if grade.is_empty() {
            eprintln!("A grade level is required before uploading a document.");
            use_args = false;
            continue;
        }
        coach
            .set_grade_level(&grade)
            .map_err(|e| anyhow::anyhow!("{e}"))?;

        let path = match args.file.clone().filter(|_| use_args) {
            Some(path) => path,
            None => PathBuf::from(prompt("Document path")?),
        };
        use_args = false;
        let file = UploadedFile::from_path(&path)
            .with_context(|| format!("could not read {}", path.display()))?;

        if let Some(handle) = &mock_handle {
            script_upload_replies(handle, &file);
        }

        println!("Processing {}...", file.name);
        if let Err(e) = coach.upload(&file).await {
            eprintln!("Error: {e}");
            continue;
        }

        if coach.session().credential_blocked() {
            eprintln!("{CREDENTIAL_BANNER}");
            bail!("credential configuration required");
        }
        if let Some(error) = coach.session().error() {
            eprintln!("Error: {error}");
            continue;
        }

        while coach.session().phase() == SessionPhase::AwaitingQuestionSelection {
            println!();
            println!("Pick a question:");
            for (i, question) in coach.session().questions().iter().enumerate() {
                let answered = if question.feedback.is_some() { " (answered)" } else { "" };
                println!("  {}. {}{}", i + 1, question.text, answered);
            }
            let choice = prompt("Question number")?;
            let index = match choice.parse::<usize>() {
                Ok(n) if n >= 1 => n - 1,
                _ => {
                    eprintln!("Enter a number between 1 and {}.", coach.session().questions().len());
                    continue;
                }
            };
            if let Err(e) = coach.select_question(index) {
                eprintln!("Error: {e}");
                continue;
            }

            while coach.session().phase() == SessionPhase::AwaitingAnswer {
                println!();
                if let Some(question) = coach.session().selected_question_text() {
                    println!("{question}");
                }
                let answer = prompt_answer()?;

                if let Some(handle) = &mock_handle {
                    script_evaluation_reply(handle);
                }
                println!("Evaluating your answer...");
                if let Err(e) = coach.submit_answer(&answer).await {
                    eprintln!("Error: {e}");
                    continue;
                }
                if coach.session().credential_blocked() {
                    eprintln!("{CREDENTIAL_BANNER}");
                    bail!("credential configuration required");
                }
                if let Some(error) = coach.session().error() {
                    // Evaluation failed; the question stays selected for resubmission.
                    eprintln!("Error: {error}");
                }
            }

            if let Some(feedback) = coach.session().feedback() {
                print_feedback(feedback);
            }

            loop {
                let action = prompt("[a]nswer another, [e]xport history, [r]estart, [q]uit")?;
                match action.to_lowercase().as_str() {
                    "a" => {
                        coach.answer_another().map_err(|e| anyhow::anyhow!("{e}"))?;
                        break;
                    }
                    "e" => {
                        let target = args.export_dir.join(HISTORY_FILENAME);
                        std::fs::write(&target, coach.export_history())
                            .with_context(|| format!("could not write {}", target.display()))?;
                        println!("History exported to {}", target.display());
                    }
                    "r" => {
                        coach.restart();
                        continue 'session;
                    }
                    "q" => return Ok(()),
                    _ => eprintln!("Enter a, e, r, or q."),
                }
            }
        }
    }
}
