//! Parsing of the exception a submission raised, from its stderr.

/// An unhandled exception raised by submitted code.
///
/// This is informational only: a user fault is a normal completion with a
/// non-zero exit code, never an engine error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFault {
    /// The type of Python exception (e.g., "ValueError", "ZeroDivisionError").
    pub exception_type: String,
    /// The exception message, possibly empty.
    pub message: String,
    /// The full traceback, if one was printed.
    pub traceback: Option<String>,
}

impl UserFault {
    /// Extract the last raised exception from Python's stderr format.
    pub fn from_stderr(stderr: &str) -> Option<Self> {
        if stderr.trim().is_empty() {
            return None;
        }

        let lines: Vec<&str> = stderr.lines().collect();

        let mut exception_line = None;
        let mut traceback_start = None;

        for (i, line) in lines.iter().enumerate() {
            if line.starts_with("Traceback (most recent call last):") {
                traceback_start = Some(i);
            } else if !line.starts_with(' ') && looks_like_exception(line) {
                exception_line = Some((i, *line));
            }
        }

        let (line_idx, exception_str) = exception_line?;
        let (exception_type, message) = match exception_str.split_once(':') {
            Some((ty, msg)) => (ty.trim().to_string(), msg.trim().to_string()),
            None => (exception_str.trim().to_string(), String::new()),
        };

        let traceback = traceback_start
            .filter(|start| *start < line_idx)
            .map(|start| lines[start..=line_idx].join("\n"));

        Some(Self {
            exception_type,
            message,
            traceback,
        })
    }
}

/// Check if a line starts with something shaped like an exception name.
fn looks_like_exception(line: &str) -> bool {
    const SUFFIXES: [&str; 3] = ["Error", "Exception", "Warning"];
    const STANDALONE: [&str; 4] = [
        "KeyboardInterrupt",
        "SystemExit",
        "StopIteration",
        "GeneratorExit",
    ];

    // The name ends at the first ':' or the end of the line; dotted module
    // prefixes such as `json.decoder.JSONDecodeError` are allowed.
    let name = line.split(':').next().unwrap_or(line).trim_end();
    if name.contains(char::is_whitespace) {
        return false;
    }
    let last = name.rsplit('.').next().unwrap_or(name);
    if !last.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        return false;
    }

    SUFFIXES.iter().any(|suffix| last.ends_with(suffix)) || STANDALONE.contains(&last)
}
