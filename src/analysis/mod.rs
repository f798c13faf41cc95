pub mod error;
pub mod lint;

use crate::parser::ast::Project;

use error::Diagnostic;
use lint::run_lints;

pub struct AnalysisResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

pub fn analyze_project(project: &Project) -> AnalysisResult {
    let mut diagnostics = run_lints(project);

    if project.events.is_empty() && !project.widgets.is_empty() {
        diagnostics.push(Diagnostic::info("Project has widgets but no events"));
    }

    AnalysisResult { diagnostics }
}
