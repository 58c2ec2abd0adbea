//! Line-oriented chat loop for the `chat` subcommand.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use maeser_backend::core::errors::RagError;
use maeser_backend::graph::{Feedback, Role, Turn};
use maeser_backend::session::SessionManager;

const HELP: &str = "Commands: /history, /like [n], /dislike [n], /new, /help, /quit";

pub async fn run(
    sessions: &SessionManager,
    branch: &str,
    session: Option<String>,
    user: Option<&str>,
) -> anyhow::Result<()> {
    let mut session_id = match session {
        Some(id) => id,
        None => sessions.new_session_id(branch, user)?,
    };
    println!("Branch '{}', session {}", branch, session_id);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" | "exit" | "quit" => break,
            "/help" => println!("{}", HELP),
            "/new" => {
                session_id = sessions.new_session_id(branch, user)?;
                println!("New session {}", session_id);
            }
            "/history" => {
                let turns = sessions.conversation_history(branch, &session_id).await?;
                print_history(&turns);
            }
            command if command.starts_with("/like") || command.starts_with("/dislike") => {
                rate(sessions, branch, &session_id, command).await?;
            }
            question => match sessions.ask(branch, &session_id, question).await {
                Ok(response) => {
                    println!("{}", response.answer);
                    if !response.topics.is_empty() {
                        println!("  [topics: {}]", response.topics.join(", "));
                    }
                }
                Err(err) if err.is_retryable() => println!("(busy, try again) {}", err),
                Err(err) => return Err(err.into()),
            },
        }
    }

    Ok(())
}

/// `/like` and `/dislike` rate the latest answer, or message `n` when given.
async fn rate(
    sessions: &SessionManager,
    branch: &str,
    session_id: &str,
    command: &str,
) -> anyhow::Result<()> {
    let mut parts = command.split_whitespace();
    let feedback = match parts.next().map(|c| c.trim_start_matches('/')) {
        Some(kind) => match Feedback::from_str(kind) {
            Some(feedback) => feedback,
            None => {
                println!("{}", HELP);
                return Ok(());
            }
        },
        None => return Ok(()),
    };

    let index = match parts.next() {
        Some(raw) => match raw.parse::<usize>() {
            Ok(index) => index,
            Err(_) => {
                println!("Message index must be a number");
                return Ok(());
            }
        },
        None => {
            let turns = sessions.conversation_history(branch, session_id).await?;
            match turns.iter().rposition(|turn| turn.role == Role::Assistant) {
                Some(index) => index,
                None => {
                    println!("Nothing to rate yet");
                    return Ok(());
                }
            }
        }
    };

    match sessions.add_feedback(branch, session_id, index, feedback).await {
        Ok(()) => println!("Recorded {} for message {}", feedback.as_str(), index),
        Err(err @ (RagError::BadRequest(_) | RagError::NotFound(_))) => println!("{}", err),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

pub fn print_history(turns: &[Turn]) {
    if turns.is_empty() {
        println!("(no messages)");
        return;
    }
    for (index, turn) in turns.iter().enumerate() {
        let rating = turn
            .feedback
            .map(|f| format!(" [{}]", f.as_str()))
            .unwrap_or_default();
        println!("{:>3} {}{}: {}", index, turn.role.as_str(), rating, turn.content);
    }
}
