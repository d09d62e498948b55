use regex::bytes::Regex;
use std::io::{self, Write};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const REDACTED: &[u8] = b"[REDACTED]";

/// Log to stderr; `RUST_LOG` wins over the `--verbose` default.
///
/// With `redact`, runs of six or more digits (account and card numbers)
/// are masked before they reach the terminal.
pub fn setup_logging(verbose: bool, redact: bool) -> Result<(), regex::Error> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let writer = if redact {
        Redacting::masking(io::stderr)?
    } else {
        Redacting::passthrough(io::stderr)
    };
    let stderr_log = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(false)
        .without_time();

    tracing_subscriber::registry()
        .with(stderr_log.with_filter(filter))
        .init();
    Ok(())
}

/// `MakeWriter` wrapper that optionally masks long digit runs.
pub struct Redacting<M> {
    inner: M,
    digits: Option<Regex>,
}

impl<M> Redacting<M> {
    pub fn masking(inner: M) -> Result<Self, regex::Error> {
        Ok(Self {
            inner,
            digits: Some(Regex::new("[0-9]{6,}")?),
        })
    }

    pub fn passthrough(inner: M) -> Self {
        Self { inner, digits: None }
    }
}

impl<'a, M: MakeWriter<'a>> MakeWriter<'a> for Redacting<M> {
    type Writer = RedactingWriter<'a, M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: self.inner.make_writer(),
            digits: self.digits.as_ref(),
        }
    }
}

/// The fmt layer hands each formatted event over in one `write_all`, so a
/// digit run is never split across calls.
pub struct RedactingWriter<'a, W> {
    inner: W,
    digits: Option<&'a Regex>,
}

impl<W: Write> Write for RedactingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.digits {
            Some(digits) => {
                self.inner.write_all(&digits.replace_all(buf, REDACTED))?;
                Ok(buf.len())
            }
            None => self.inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture(redact: bool, log: impl FnOnce()) -> String {
        let captured = Captured::default();
        let sink = captured.clone();
        let make = move || sink.clone();
        let writer = if redact {
            Redacting::masking(make).unwrap()
        } else {
            Redacting::passthrough(make)
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, log);

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_long_digit_runs_masked() {
        let out = capture(true, || {
            tracing::info!("account 12345678 card 4111111111111111 ref 12345 on 2024-01-05");
        });
        assert!(out.contains("account [REDACTED] card [REDACTED] ref 12345 on 2024-01-05"));
        assert!(!out.contains("12345678"));
    }

    #[test]
    fn test_passthrough_leaves_digits() {
        let out = capture(false, || tracing::warn!("account 12345678"));
        assert!(out.contains("account 12345678"));
    }
}
