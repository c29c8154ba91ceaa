//! Line-oriented Reed REPL.
//!
//! Reads logical lines (pulling continuation lines while a declaration is
//! syntactically open), runs the pass pipeline, and compiles each line into
//! a session-wide bytecode buffer. Prints the post-pass IR; `:bc` toggles
//! a disassembly of the freshly emitted opcodes.

mod session;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::session::{ReplOutcome, ReplSession};

fn main() -> rustyline::Result<()> {
    println!("Reed compiler REPL -- :bc toggles bytecode, :quit exits");
    let mut editor = DefaultEditor::new()?;
    let mut session = ReplSession::new();

    loop {
        let prompt = if session.has_pending() { "....> " } else { "reed> " };
        match editor.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if !session.has_pending() {
                    match trimmed {
                        ":quit" | ":q" => break,
                        ":bc" => {
                            let on = session.toggle_bytecode();
                            println!("bytecode display {}", if on { "on" } else { "off" });
                            continue;
                        }
                        "" => continue,
                        _ => {}
                    }
                }
                let _ = editor.add_history_entry(&line);
                match session.feed(&line) {
                    ReplOutcome::NeedMore => {}
                    ReplOutcome::Evaluated { ir, bytecode } => {
                        print!("{ir}");
                        if let Some(bytecode) = bytecode {
                            print!("{bytecode}");
                        }
                    }
                    ReplOutcome::Error(rendered) => eprint!("{rendered}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                session.clear_pending();
                println!("^C");
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("error: {err}");
                break;
            }
        }
    }
    Ok(())
}
