// src/errors/report.rs
//! Non-fatal diagnostics channel.
//!
//! Debug/Info/Warning events accumulate on the reporter; an Error aborts the
//! pipeline immediately and is surfaced as a `CompileError` instead, so there
//! is no Error variant here.

use crate::frontend::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warning,
}

#[derive(Debug, Clone)]
pub struct DiagnosticEvent {
    pub level: DiagnosticLevel,
    pub message: String,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct Reporter {
    events: Vec<DiagnosticEvent>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug(&mut self, message: impl Into<String>, span: Span) {
        let message = message.into();
        tracing::debug!(%message, "diagnostic");
        self.push(DiagnosticLevel::Debug, message, span);
    }

    pub fn info(&mut self, message: impl Into<String>, span: Span) {
        let message = message.into();
        tracing::info!(%message, "diagnostic");
        self.push(DiagnosticLevel::Info, message, span);
    }

    pub fn warning(&mut self, message: impl Into<String>, span: Span) {
        let message = message.into();
        tracing::warn!(%message, "diagnostic");
        self.push(DiagnosticLevel::Warning, message, span);
    }

    fn push(&mut self, level: DiagnosticLevel, message: String, span: Span) {
        self.events.push(DiagnosticEvent {
            level,
            message,
            span,
        });
    }

    pub fn events(&self) -> &[DiagnosticEvent] {
        &self.events
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticEvent> {
        self.events
            .iter()
            .filter(|e| e.level == DiagnosticLevel::Warning)
    }
}
