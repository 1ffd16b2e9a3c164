//! Reading framed replies from the engine's console output.

use std::io::BufRead;

use matlab_mcp_core::{EngineError, EngineValue, NdArray};

use crate::script::Frame;

/// Console prompt an interactive engine prints before reading a statement.
const PROMPT: &str = ">> ";

/// Line reader over engine stdout.
pub struct Transcript<R> {
    reader: R,
}

impl<R: BufRead> Transcript<R> {
    pub const fn new(reader: R) -> Self {
        Self { reader }
    }

    fn next_line(&mut self) -> Result<String, EngineError> {
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf) {
            Ok(0) => Err(EngineError::Communication(
                "engine closed its output stream".to_string(),
            )),
            Ok(_) => Ok(String::from_utf8_lossy(&buf).into_owned()),
            Err(e) => Err(EngineError::Communication(format!(
                "failed to read engine output: {e}"
            ))),
        }
    }

    /// Read one framed reply.
    ///
    /// Text before `BEGIN` is dropped, as is a prompt that arrives right
    /// after it. On `OK` the console text produced by the body is returned;
    /// on `ERR` the engine's error message becomes an execution error.
    ///
    /// # Errors
    /// `Execution` for a caught script error, `Communication` if the stream
    /// ends or breaks mid-reply.
    pub fn read_reply(&mut self, frame: &Frame) -> Result<String, EngineError> {
        let (begin, ok, err, end) = (frame.begin(), frame.ok(), frame.err(), frame.end());

        loop {
            let line = self.next_line()?;
            if line.contains(&begin) {
                break;
            }
            let noise = line.trim_end();
            if !noise.is_empty() {
                tracing::debug!(target: "engine_stdout", "{noise}");
            }
        }

        let mut output = String::new();
        let mut first = true;
        loop {
            let mut line = self.next_line()?;
            if std::mem::take(&mut first) {
                line = strip_prompts(&line).to_string();
            }
            if let Some(at) = line.find(&ok) {
                output.push_str(&line[..at]);
                // The OK sentinel is printed after a forced newline.
                if output.ends_with('\n') {
                    output.pop();
                }
                return Ok(output);
            }
            if let Some(at) = line.find(&err) {
                output.push_str(&line[..at]);
                if !output.trim().is_empty() {
                    tracing::debug!(target: "engine_stdout", "{}", output.trim_end());
                }
                return Err(EngineError::Execution(self.read_error_message(&end)?));
            }
            output.push_str(&line);
        }
    }

    fn read_error_message(&mut self, end: &str) -> Result<String, EngineError> {
        let mut message = String::new();
        loop {
            let line = self.next_line()?;
            if let Some(at) = line.find(end) {
                message.push_str(&line[..at]);
                return Ok(message.trim().to_string());
            }
            message.push_str(&line);
        }
    }
}

fn strip_prompts(line: &str) -> &str {
    let mut rest = line;
    while let Some(stripped) = rest.strip_prefix(PROMPT) {
        rest = stripped;
    }
    rest
}

fn malformed(what: &str) -> EngineError {
    EngineError::Communication(format!("malformed workspace reply: {what}"))
}

fn parse_real(token: &str) -> Option<f64> {
    match token {
        "NaN" | "nan" => Some(f64::NAN),
        "Inf" | "inf" => Some(f64::INFINITY),
        "-Inf" | "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

/// Parse the reply printed by [`crate::script::read_variable`].
///
/// # Errors
/// Returns a communication error if the reply does not follow the layout.
pub fn parse_variable(reply: &str) -> Result<Option<EngineValue>, EngineError> {
    let mut lines = reply.lines();

    match lines.next().map(str::trim) {
        Some("ABSENT") => return Ok(None),
        Some("PRESENT") => {}
        other => return Err(malformed(&format!("unexpected header {other:?}"))),
    }

    let class = lines
        .next()
        .map(|l| l.trim().to_string())
        .ok_or_else(|| malformed("missing class"))?;
    let dims = lines
        .next()
        .ok_or_else(|| malformed("missing size"))?
        .split_whitespace()
        .map(str::parse::<usize>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| malformed(&format!("bad size: {e}")))?;
    let kind = lines
        .next()
        .map(str::trim)
        .ok_or_else(|| malformed("missing kind"))?;

    let value = match kind {
        "numeric" => {
            let data = lines
                .filter(|l| !l.trim().is_empty())
                .map(|l| parse_real(l.trim()).ok_or_else(|| malformed(&format!("bad number {l:?}"))))
                .collect::<Result<Vec<_>, _>>()?;
            let array = NdArray::new(dims, data).map_err(|e| malformed(&e.to_string()))?;
            EngineValue::Numeric { class, array }
        }
        "integer" => {
            let data = lines
                .filter(|l| !l.trim().is_empty())
                .map(|l| {
                    l.trim()
                        .parse::<i128>()
                        .map_err(|e| malformed(&format!("bad integer {l:?}: {e}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let array = NdArray::new(dims, data).map_err(|e| malformed(&e.to_string()))?;
            EngineValue::Integer { class, array }
        }
        "logical" => {
            let data = lines
                .filter(|l| !l.trim().is_empty())
                .map(|l| match l.trim() {
                    "0" => Ok(false),
                    "1" => Ok(true),
                    other => Err(malformed(&format!("bad logical {other:?}"))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            let array = NdArray::new(dims, data).map_err(|e| malformed(&e.to_string()))?;
            EngineValue::Logical(array)
        }
        "char" => EngineValue::Char(lines.collect::<Vec<_>>().join("\n")),
        "other" => EngineValue::Other {
            class,
            description: lines.collect::<Vec<_>>().join("\n").trim_end().to_string(),
        },
        other => return Err(malformed(&format!("unknown kind {other:?}"))),
    };

    Ok(Some(value))
}
