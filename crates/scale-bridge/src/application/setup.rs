//! Interactive startup prompts: serial port choice and InfluxDB setup.
//!
//! Both prompts are written against `BufRead`/`Write` rather than the real
//! terminal so they can be driven from tests with in-memory buffers.  `main.rs`
//! runs them on a blocking thread with locked stdin/stdout.
//!
//! End-of-input (Ctrl+D, or stdin not attached to a terminal) is treated as
//! "no answer": the port prompt gives up and the InfluxDB prompt disables
//! metrics.
//!
//! The InfluxDB API token is the one exception to the reader/writer rule: on a
//! terminal it is read with `rpassword` so the secret is not echoed.

use std::io::{self, BufRead, IsTerminal, Write};

use scale_core::{is_usb_port, parse_choice, PortCandidates};

use crate::domain::config::{InfluxConfig, DEFAULT_INFLUX_URL};

// ── Port selection ────────────────────────────────────────────────────────────

/// Picks the serial port to open from the discovered candidates.
///
/// - No candidates: returns `None`.
/// - One candidate: announces it and returns it without asking.
/// - Several: prints a numbered menu and asks until a valid number is typed.
///
/// # Errors
///
/// Returns an error only if writing to `output` or reading `input` fails.
pub fn select_port<R: BufRead, W: Write>(
    candidates: &PortCandidates,
    input: &mut R,
    output: &mut W,
) -> io::Result<Option<String>> {
    let ports = &candidates.ports;
    if ports.is_empty() {
        return Ok(None);
    }

    if !candidates.usb_only {
        writeln!(output, "No USB serial devices found — showing all ports:")?;
    }

    if let [only] = ports.as_slice() {
        let tag = if is_usb_port(only) { " [USB]" } else { "" };
        writeln!(output, "Found serial port: {}{tag}  —  {}", only.device, only.description)?;
        return Ok(Some(only.device.clone()));
    }

    writeln!(output, "Serial devices found:\n")?;
    for (i, port) in ports.iter().enumerate() {
        writeln!(output, "  [{}]  {port}", i + 1)?;
    }
    writeln!(output)?;

    loop {
        write!(output, "Type a number [1-{}] and press Enter: ", ports.len())?;
        output.flush()?;

        let Some(answer) = read_answer(input)? else {
            writeln!(output)?;
            return Ok(None);
        };
        if let Some(index) = parse_choice(&answer, ports.len()) {
            return Ok(Some(ports[index].device.clone()));
        }
        writeln!(output, "  Please enter a number between 1 and {}", ports.len())?;
    }
}

// ── InfluxDB setup ────────────────────────────────────────────────────────────

/// How the API token is typed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEntry {
    /// Read from the terminal without echo (`rpassword`).
    Hidden,
    /// Read from the prompt's `input` like every other answer.
    Echoed,
}

impl TokenEntry {
    /// Hidden when stdin is an interactive terminal; echoed when input is piped.
    pub fn for_stdin() -> Self {
        Self::from_terminal(io::stdin().is_terminal())
    }

    fn from_terminal(is_terminal: bool) -> Self {
        if is_terminal {
            Self::Hidden
        } else {
            Self::Echoed
        }
    }
}

/// Asks whether to enable InfluxDB logging and, if so, collects its settings.
///
/// Returns `Ok(None)` when the operator declines, input ends, or any required
/// field is left blank.  The connection itself is checked by the caller.
///
/// # Errors
///
/// Returns an error only if writing to `output` or reading `input` fails.
pub fn prompt_influx_config<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    token_entry: TokenEntry,
) -> io::Result<Option<InfluxConfig>> {
    let enable = ask(input, output, "\nEnable InfluxDB logging? [y/N]: ")?;
    if !enable.is_some_and(|answer| answer.eq_ignore_ascii_case("y")) {
        return Ok(None);
    }

    writeln!(output, "\n── InfluxDB Setup ──────────────────────────────────")?;
    let url = ask(input, output, &format!("URL [{DEFAULT_INFLUX_URL}]: "))?
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| DEFAULT_INFLUX_URL.to_string());
    let org = ask(input, output, "Organization: ")?.unwrap_or_default();
    let bucket = ask(input, output, "Bucket: ")?.unwrap_or_default();
    writeln!(output, "API Token")?;
    writeln!(output, "  (Find yours at: InfluxDB UI → Load Data → API Tokens)")?;
    let token = match token_entry {
        TokenEntry::Echoed => ask(input, output, TOKEN_PROMPT)?.unwrap_or_default(),
        TokenEntry::Hidden => {
            output.flush()?;
            rpassword::prompt_password(TOKEN_PROMPT)?.trim().to_string()
        }
    };
    writeln!(output, "  Use snake_case for the measurement, e.g. kern_lab1")?;
    let measurement = ask(input, output, "Measurement name: ")?.unwrap_or_default();

    let config = InfluxConfig {
        url,
        org,
        bucket,
        token,
        measurement,
    };
    if !config.is_complete() {
        writeln!(output, "Missing required fields — InfluxDB logging disabled.")?;
        return Ok(None);
    }
    Ok(Some(config))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

const TOKEN_PROMPT: &str = "  Token: ";

/// Prints `prompt` and reads one trimmed answer; `None` on end of input.
fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> io::Result<Option<String>> {
    write!(output, "{prompt}")?;
    output.flush()?;
    read_answer(input)
}

fn read_answer<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
