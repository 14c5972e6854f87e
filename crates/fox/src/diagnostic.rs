//! Diagnostic reporting.
//!
//! Spec §6.2 lists the diagnostic engine as an externally consumed collaborator; nothing
//! upstream supplies one, so this module implements the minimal contract the rest of the
//! pipeline relies on: `report(diagId, loc)` returns a builder accepting `.add_arg(value)` for
//! `%0`/`%1`/... placeholder substitution, emitting on drop. A [`DiagnosticVerifier`] adapts
//! this into the `expect-<severity>: <text>` test harness from spec §6.2.

use std::fmt;

use crate::source::{SourceManager, SourceRange};

/// Diagnostic severities, from least to most serious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum Severity {
    Ignored,
    Note,
    Warning,
    Error,
    Fatal,
}

/// The closed catalogue of diagnostics the pipeline can emit.
///
/// Each id carries a fixed severity and message template (with `%0`, `%1`, ... placeholders),
/// supplementing spec §6.2 per SPEC_FULL.md §C.2 (the original implementation enumerates
/// diagnostics the same way rather than formatting ad hoc strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum DiagId {
    ExpectedDeclInUnit,
    ExpectedToken,
    ExpectedExpr,
    ExpectedType,
    ExpectedIdentifier,
    UnclosedBracket,
    UnknownEscapeSequence,
    InvalidCharLiteral,
    UnresolvedIdentifier,
    InvalidVarRedeclaration,
    InvalidParamRedeclaration,
    InvalidFuncRedeclaration,
    InvalidCrossKindRedeclaration,
    FirstDeclaredHere,
    CannotInitializeVariable,
    CannotUnifyTypes,
    MissingReturn,
    UnreachableCode,
    InvalidUnaryOperand,
    InvalidBinaryOperands,
    AssignToNonLvalue,
    SubscriptNonArray,
    NonIntSubscript,
    CallNonFunction,
    ArgumentCountMismatch,
    InvalidCast,
    UnknownMember,
    GlobalInitializerNotConstant,
    EntryPointNotFound,
    JumpOffsetOverflow,
}

impl DiagId {
    #[must_use]
    pub fn default_severity(self) -> Severity {
        use DiagId::{FirstDeclaredHere, JumpOffsetOverflow, UnreachableCode};
        match self {
            FirstDeclaredHere => Severity::Note,
            UnreachableCode => Severity::Warning,
            JumpOffsetOverflow => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    #[must_use]
    pub fn template(self) -> &'static str {
        use DiagId::{
            ArgumentCountMismatch, AssignToNonLvalue, CallNonFunction, CannotInitializeVariable, CannotUnifyTypes,
            EntryPointNotFound, ExpectedDeclInUnit, ExpectedExpr, ExpectedIdentifier, ExpectedToken, ExpectedType,
            FirstDeclaredHere, GlobalInitializerNotConstant, InvalidBinaryOperands, InvalidCast, InvalidCharLiteral,
            InvalidCrossKindRedeclaration, InvalidFuncRedeclaration, InvalidParamRedeclaration,
            InvalidUnaryOperand, InvalidVarRedeclaration, JumpOffsetOverflow, MissingReturn, NonIntSubscript,
            SubscriptNonArray, UnclosedBracket, UnknownEscapeSequence, UnknownMember, UnreachableCode,
            UnresolvedIdentifier,
        };
        match self {
            ExpectedDeclInUnit => "expected declaration in unit",
            ExpectedToken => "expected %0",
            ExpectedExpr => "expected expression",
            ExpectedType => "expected type",
            ExpectedIdentifier => "expected identifier",
            UnclosedBracket => "unclosed bracket, expected %0",
            UnknownEscapeSequence => "unknown escape sequence %0",
            InvalidCharLiteral => "character literal must contain exactly one character",
            UnresolvedIdentifier => "use of undeclared identifier %0",
            InvalidVarRedeclaration => "invalid variable redeclaration of %0",
            InvalidParamRedeclaration => "invalid parameter redeclaration of %0",
            InvalidFuncRedeclaration => "invalid function redeclaration of %0",
            InvalidCrossKindRedeclaration => "invalid redeclaration of %0 as a different kind of symbol",
            FirstDeclaredHere => "first declared here",
            CannotInitializeVariable => "cannot initialize variable of type %0 with expression of type %1",
            CannotUnifyTypes => "incompatible types %0 and %1",
            MissingReturn => "missing return in function %0 returning %1",
            UnreachableCode => "unreachable statement",
            InvalidUnaryOperand => "invalid operand type %0 for unary operator %1",
            InvalidBinaryOperands => "invalid operand types %0 and %1 for operator %2",
            AssignToNonLvalue => "expression is not assignable",
            SubscriptNonArray => "cannot subscript a value of type %0",
            NonIntSubscript => "array subscript must be of type int, got %0",
            CallNonFunction => "cannot call a value of type %0",
            ArgumentCountMismatch => "expected %0 arguments, got %1",
            InvalidCast => "cannot cast value of type %0 to %1",
            UnknownMember => "no member %0 on type %1",
            GlobalInitializerNotConstant => "global variable initializers cannot reference other declarations",
            EntryPointNotFound => "no entry point function %0 found",
            JumpOffsetOverflow => "jump offset out of the 16-bit signed range during code generation",
        }
    }
}

/// A single emitted diagnostic: id, severity (possibly escalated by policy), location, and
/// substituted arguments.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub id: DiagId,
    pub severity: Severity,
    pub loc: SourceRange,
    pub args: Vec<String>,
}

impl Diagnostic {
    /// Renders the message template with its arguments substituted.
    #[must_use]
    pub fn message(&self) -> String {
        let mut out = String::new();
        let template = self.id.template();
        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '%' {
                if let Some(d) = chars.peek().copied() {
                    if d.is_ascii_digit() {
                        chars.next();
                        let idx = d.to_digit(10).unwrap() as usize;
                        out.push_str(self.args.get(idx).map_or("?", String::as_str));
                        continue;
                    }
                }
            }
            out.push(c);
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message())
    }
}

/// Policy flags controlling severity escalation and emission caps.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticPolicy {
    pub warnings_as_errors: bool,
    pub errors_as_fatal: bool,
    pub error_cap: Option<u32>,
}

impl Default for DiagnosticPolicy {
    fn default() -> Self {
        Self { warnings_as_errors: false, errors_as_fatal: false, error_cap: None }
    }
}

/// Accumulates emitted diagnostics and applies [`DiagnosticPolicy`].
///
/// `report` returns a [`DiagnosticBuilder`] which emits on drop, matching spec §6.2's
/// `report(diagId, location)` contract.
pub struct DiagnosticEngine {
    policy: DiagnosticPolicy,
    diagnostics: Vec<Diagnostic>,
    error_count: u32,
    had_fatal: bool,
    /// Optional hook (used by [`DiagnosticVerifier`]) deciding whether a diagnostic should be
    /// forwarded into `diagnostics` (`true`) or swallowed as expected (`false`).
    verify_hook: Option<Box<dyn FnMut(&Diagnostic) -> bool>>,
}

impl Default for DiagnosticEngine {
    fn default() -> Self {
        Self::new(DiagnosticPolicy::default())
    }
}

impl DiagnosticEngine {
    #[must_use]
    pub fn new(policy: DiagnosticPolicy) -> Self {
        Self { policy, diagnostics: Vec::new(), error_count: 0, had_fatal: false, verify_hook: None }
    }

    /// Installs a verification hook; see [`DiagnosticVerifier::verify`].
    pub fn set_verify_hook(&mut self, hook: impl FnMut(&Diagnostic) -> bool + 'static) {
        self.verify_hook = Some(Box::new(hook));
    }

    /// Begins reporting a diagnostic at `loc`.
    pub fn report(&mut self, id: DiagId, loc: SourceRange) -> DiagnosticBuilder<'_> {
        DiagnosticBuilder { engine: self, id, loc, args: Vec::new() }
    }

    fn emit(&mut self, mut diag: Diagnostic) {
        if self.had_fatal {
            return;
        }
        if diag.severity == Severity::Warning && self.policy.warnings_as_errors {
            diag.severity = Severity::Error;
        }
        if diag.severity == Severity::Error && self.policy.errors_as_fatal {
            diag.severity = Severity::Fatal;
        }
        if let Some(hook) = self.verify_hook.as_mut() {
            if !hook(&diag) {
                return;
            }
        }
        if diag.severity == Severity::Error {
            if let Some(cap) = self.policy.error_cap {
                if self.error_count >= cap {
                    return;
                }
            }
            self.error_count += 1;
        }
        if diag.severity == Severity::Fatal {
            self.had_fatal = true;
        }
        self.diagnostics.push(diag);
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity >= Severity::Error)
    }

    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.error_count
    }
}

/// Builder returned by [`DiagnosticEngine::report`]. Emits the diagnostic when dropped.
pub struct DiagnosticBuilder<'a> {
    engine: &'a mut DiagnosticEngine,
    id: DiagId,
    loc: SourceRange,
    args: Vec<String>,
}

impl DiagnosticBuilder<'_> {
    #[must_use]
    pub fn add_arg(mut self, value: impl fmt::Display) -> Self {
        self.args.push(value.to_string());
        self
    }
}

impl Drop for DiagnosticBuilder<'_> {
    fn drop(&mut self) {
        let severity = self.id.default_severity();
        let diag = Diagnostic { id: self.id, severity, loc: self.loc, args: std::mem::take(&mut self.args) };
        self.engine.emit(diag);
    }
}

/// Renders diagnostics for display, using a [`SourceManager`] to resolve locations.
#[must_use]
pub fn render(diag: &Diagnostic, files: &SourceManager) -> String {
    let loc = files.complete_loc(diag.loc.begin());
    format!("{}:{}: {}: {}", files.path(diag.loc.begin().file()), loc, diag.severity, diag.message())
}

/// One `expect-<severity>[@(+|-)<n>]: <text>` directive parsed out of a test fixture.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ExpectedDiag {
    severity: Severity,
    line: u32,
    text: String,
}

/// Parses `expect-` directives from source text and checks emitted diagnostics against them.
///
/// Spec §6.2: parses files for `expect-<severity>[@(+|-)<n>]: <text>` line comments, intercepts
/// emitted diagnostics via [`verify`](Self::verify) (returning `true` to forward, `false` to
/// swallow), and [`finish`](Self::finish) reports any expectation that was never observed.
pub struct DiagnosticVerifier {
    expected: Vec<ExpectedDiag>,
    observed: Vec<bool>,
}

impl DiagnosticVerifier {
    /// Scans `source` for `// expect-...` directives on each line.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let mut expected = Vec::new();
        for (zero_based_line, line) in source.lines().enumerate() {
            let Some(idx) = line.find("expect-") else { continue };
            let rest = &line[idx + "expect-".len()..];
            let Some((sev_str, after_sev)) = split_at_first(rest, |c: char| !c.is_ascii_alphabetic()) else {
                continue;
            };
            let severity = match sev_str {
                "error" => Severity::Error,
                "warning" => Severity::Warning,
                "note" => Severity::Note,
                "fatal" => Severity::Fatal,
                _ => continue,
            };
            let mut target_line = u32::try_from(zero_based_line + 1).unwrap();
            let mut remainder = after_sev;
            if let Some(stripped) = remainder.strip_prefix('@') {
                let sign = stripped.chars().next();
                let digits_start = usize::from(sign == Some('+') || sign == Some('-'));
                let (digits, after) = split_at_first(&stripped[digits_start..], |c: char| !c.is_ascii_digit())
                    .unwrap_or((&stripped[digits_start..], ""));
                if let Ok(n) = digits.parse::<i64>() {
                    let delta = if sign == Some('-') { -n } else { n };
                    target_line = (i64::from(target_line) + delta).max(1) as u32;
                }
                remainder = after;
            }
            let Some(colon) = remainder.find(':') else { continue };
            let text = remainder[colon + 1..].trim().to_owned();
            expected.push(ExpectedDiag { severity, line: target_line, text });
        }
        let len = expected.len();
        Self { expected, observed: vec![false; len] }
    }

    /// Returns `true` if `diag` should still be forwarded to the caller's diagnostic sink
    /// (i.e. it was not expected), `false` if it matched an expectation and was swallowed.
    pub fn verify(&mut self, diag: &Diagnostic, files: &SourceManager) -> bool {
        let line = files.complete_loc(diag.loc.begin()).line;
        let message = diag.message();
        for (expected, seen) in self.expected.iter().zip(self.observed.iter_mut()) {
            if !*seen && expected.severity == diag.severity && expected.line == line && message.contains(&expected.text) {
                *seen = true;
                return false;
            }
        }
        true
    }

    /// Reports (as a formatted string list) every expectation that was never observed.
    #[must_use]
    pub fn finish(&self) -> Vec<String> {
        self.expected
            .iter()
            .zip(&self.observed)
            .filter(|(_, seen)| !**seen)
            .map(|(e, _)| format!("expected {} at line {} matching {:?} was never emitted", e.severity, e.line, e.text))
            .collect()
    }
}

fn split_at_first(s: &str, pred: impl Fn(char) -> bool) -> Option<(&str, &str)> {
    s.char_indices().find(|&(_, c)| pred(c)).map_or(Some((s, "")), |(i, _)| Some((&s[..i], &s[i..])))
}

#[cfg(test)]
mod tests {
    use super::{DiagId, DiagnosticEngine};
    use crate::source::{SourceManager, SourceRange};

    #[test]
    fn placeholder_substitution() {
        let mut sm = SourceManager::new();
        let file = sm.add_buffer("t.fox", "x");
        let loc = sm.loc_at(file, 0);
        let mut engine = DiagnosticEngine::default();
        engine.report(DiagId::CannotInitializeVariable, SourceRange::single(loc)).add_arg("int").add_arg("string");
        let diag = &engine.diagnostics()[0];
        assert_eq!(diag.message(), "cannot initialize variable of type int with expression of type string");
    }

    #[test]
    fn error_cap_suppresses_further_errors() {
        use crate::diagnostic::DiagnosticPolicy;
        let mut sm = SourceManager::new();
        let file = sm.add_buffer("t.fox", "x");
        let loc = SourceRange::single(sm.loc_at(file, 0));
        let mut engine = DiagnosticEngine::new(DiagnosticPolicy { error_cap: Some(1), ..DiagnosticPolicy::default() });
        engine.report(DiagId::UnresolvedIdentifier, loc).add_arg("a");
        engine.report(DiagId::UnresolvedIdentifier, loc).add_arg("b");
        assert_eq!(engine.diagnostics().len(), 1);
    }
}
