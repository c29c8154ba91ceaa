//! REPL session state.
//!
//! Accumulates physical lines until the parser reports a complete logical
//! line, then runs the pipeline and emits bytecode into a session-wide
//! buffer so register numbering continues across inputs.

use reed_codegen::opcode::Bytecode;
use reed_codegen::BytecodeGen;
use reed_common::span::{SourceInfo, SourceName};
use reed_parser::ir::{Ir, Module};
use reed_parser::{LineParse, Parser};
use reed_passes::Pipeline;

/// What became of one fed line.
pub enum ReplOutcome {
    /// The declaration is still open; feed a continuation line.
    NeedMore,
    /// The line compiled; rendered IR and (optionally) fresh bytecode.
    Evaluated {
        ir: String,
        bytecode: Option<String>,
    },
    /// A diagnostic, already rendered.
    Error(String),
}

/// Persistent state for a REPL session.
pub struct ReplSession {
    /// Physical lines of the currently open logical line.
    pending: String,
    /// Session-wide bytecode buffer.
    code: Bytecode,
    /// Register counters carried between inputs.
    counters: (u32, u32),
    /// Whether to render emitted bytecode alongside the IR.
    show_bytecode: bool,
}

impl ReplSession {
    pub fn new() -> Self {
        Self {
            pending: String::new(),
            code: Bytecode::new(),
            counters: (0, 0),
            show_bytecode: false,
        }
    }

    /// Whether a continuation line is expected.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop an unfinished logical line (Ctrl-C).
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Toggle bytecode display; returns the new state.
    pub fn toggle_bytecode(&mut self) -> bool {
        self.show_bytecode = !self.show_bytecode;
        self.show_bytecode
    }

    /// Feed one physical line.
    pub fn feed(&mut self, line: &str) -> ReplOutcome {
        self.pending.push_str(line);
        self.pending.push('\n');

        let mut parser = Parser::new(&self.pending, SourceName::Repl);
        let decls = match parser.parse_line() {
            Ok(LineParse::Incomplete) => return ReplOutcome::NeedMore,
            Ok(LineParse::Complete(decls)) => decls,
            Err(diag) => {
                let rendered = diag.render(&self.pending);
                self.pending.clear();
                return ReplOutcome::Error(rendered);
            }
        };
        let source = std::mem::take(&mut self.pending);

        let mut module = Module {
            name: SourceName::Repl.module_name(),
            body: decls,
            annotations: Vec::new(),
            doc: String::new(),
            src: SourceInfo::none(),
        };

        let mut pipeline = Pipeline::new(SourceName::Repl);
        if let Err(diag) = pipeline.run(&mut module) {
            return ReplOutcome::Error(diag.render(&source));
        }

        let start = self.code.len();
        let (reg, creg) = self.counters;
        let mut gen = BytecodeGen::with_counters(&mut self.code, SourceName::Repl, reg, creg);
        gen.set_output_values(true);
        let generated = gen.generate(&Ir::Module(module.clone()));
        self.counters = gen.counters();
        if let Err(diag) = generated {
            return ReplOutcome::Error(diag.render(&source));
        }

        let bytecode = self.show_bytecode.then(|| {
            let mut out = String::new();
            for (i, op) in self.code.ops()[start..].iter().enumerate() {
                out.push_str(&format!("{:04}  {op}\n", start + i));
            }
            out
        });

        ReplOutcome::Evaluated {
            ir: module.to_string(),
            bytecode,
        }
    }
}

impl Default for ReplSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_line_evaluates() {
        let mut session = ReplSession::new();
        match session.feed("a = 1 + 2") {
            ReplOutcome::Evaluated { ir, .. } => assert_eq!(ir, "(a = (1 + 2))\n"),
            _ => panic!("expected evaluation"),
        }
    }

    #[test]
    fn open_brace_requests_more_lines() {
        let mut session = ReplSession::new();
        assert!(matches!(
            session.feed("fun foo() {"),
            ReplOutcome::NeedMore
        ));
        assert!(session.has_pending());
        assert!(matches!(
            session.feed("return 1"),
            ReplOutcome::NeedMore
        ));
        match session.feed("}") {
            ReplOutcome::Evaluated { ir, .. } => {
                assert!(ir.contains("fun foo()"), "{ir}");
            }
            _ => panic!("expected evaluation after closing brace"),
        }
    }

    #[test]
    fn register_numbering_continues_across_lines() {
        let mut session = ReplSession::new();
        session.feed("a = 1");
        let after_first = session.counters;
        session.feed("b = 2");
        assert!(session.counters.1 > after_first.1);
    }

    #[test]
    fn trailing_operator_requests_more_lines() {
        // `1 +` can be completed by the next line, so it is not an error.
        let mut session = ReplSession::new();
        assert!(matches!(session.feed("1 +"), ReplOutcome::NeedMore));
        match session.feed("2") {
            ReplOutcome::Evaluated { ir, .. } => assert_eq!(ir, "(1 + 2)\n"),
            _ => panic!("expected evaluation"),
        }
    }

    #[test]
    fn parse_error_clears_pending() {
        let mut session = ReplSession::new();
        assert!(matches!(session.feed("foo)"), ReplOutcome::Error(_)));
        assert!(!session.has_pending());
    }
}
