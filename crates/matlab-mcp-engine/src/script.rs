//! MATLAB source generated for each engine call.
//!
//! Every call is sent as one framed block: a single `try/catch` statement
//! that prints a `BEGIN` sentinel, runs the body, then prints either `OK`
//! or `ERR <message> END`. Being one top-level statement, the block gets
//! at most one console prompt, and that prompt lands before `BEGIN`.
//! Sentinels carry a per-call id so stale output from an earlier call
//! never matches.

use std::path::Path;

/// Helper variables the generated blocks may leave behind.
const HELPER_VARS: &str = "mcp_err__ mcp_out__ mcp_row__";

/// Sentinel set for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    id: u64,
}

impl Frame {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self { id }
    }

    #[must_use]
    pub fn marker(&self, tag: &str) -> String {
        format!("<<<MCP:{}:{tag}>>>", self.id)
    }

    #[must_use]
    pub fn begin(&self) -> String {
        self.marker("BEGIN")
    }

    #[must_use]
    pub fn ok(&self) -> String {
        self.marker("OK")
    }

    #[must_use]
    pub fn err(&self) -> String {
        self.marker("ERR")
    }

    #[must_use]
    pub fn end(&self) -> String {
        self.marker("END")
    }

    /// Wrap `body` into a complete block ready to write to the engine.
    #[must_use]
    pub fn wrap(&self, body: &str) -> String {
        format!(
            r"try
fprintf('%s\n', '{begin}');
{body}
fprintf('\n%s\n', '{ok}');
catch mcp_err__
fprintf('\n%s\n%s\n%s\n', '{err}', mcp_err__.message, '{end}');
end, clear {HELPER_VARS}
",
            begin = self.begin(),
            ok = self.ok(),
            err = self.err(),
            end = self.end(),
        )
    }
}

/// Quote text as a MATLAB char expression.
///
/// Single quotes are doubled and line breaks become `char(10)` so that
/// multi-line code survives as one expression.
#[must_use]
pub fn quote(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| format!("'{}'", line.replace('\'', "''")))
        .collect();
    match lines.len() {
        0 => "''".to_string(),
        1 => lines.concat(),
        _ => format!("[{}]", lines.join(" char(10) ")),
    }
}

/// Whether `name` is a valid MATLAB identifier.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 63
}

/// Run a script file.
#[must_use]
pub fn run_script(path: &Path) -> String {
    format!("run({});", quote(&path.to_string_lossy()))
}

/// Evaluate code and print whatever it wrote to the console.
#[must_use]
pub fn eval_capture(code: &str) -> String {
    format!("mcp_out__ = evalc({});\nfprintf('%s', mcp_out__);", quote(code))
}

/// Evaluate one statement.
#[must_use]
pub fn eval(statement: &str) -> String {
    format!("eval({});", quote(statement))
}

/// Describe a workspace variable.
///
/// Prints `ABSENT`, or `PRESENT` followed by class, dimensions, kind and
/// the payload. Numeric and logical data are printed column-major, one
/// element per line; integer classes are printed with `%d` so 64-bit values
/// stay exact. `name` must already be a valid identifier.
#[must_use]
pub fn read_variable(name: &str) -> String {
    format!(
        r"if exist('{name}', 'var') ~= 1
fprintf('%s\n', 'ABSENT');
else
fprintf('%s\n', 'PRESENT');
fprintf('%s\n', class({name}));
fprintf('%d ', size({name}));
fprintf('\n');
if islogical({name})
fprintf('%s\n', 'logical');
fprintf('%d\n', {name}(:));
elseif isinteger({name}) && isreal({name})
fprintf('%s\n', 'integer');
fprintf('%d\n', {name}(:));
elseif isnumeric({name}) && isreal({name})
fprintf('%s\n', 'numeric');
fprintf('%.17g\n', double({name}(:)));
elseif ischar({name})
fprintf('%s\n', 'char');
for mcp_row__ = 1:size({name}, 1)
fprintf('%s\n', {name}(mcp_row__, :));
end
else
fprintf('%s\n', 'other');
disp({name});
end
end"
    )
}
