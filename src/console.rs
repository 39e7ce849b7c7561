//! Line-oriented channel console.
//!
//! One command per line:
//!
//! ```text
//! get QUAD:LI21:201:BACT
//! put QUAD:LI21:201:BDES -3.5
//! put QUAD:LI21:201:CTRL TRIM
//! list QUAD:
//! describe QUAD:LI21:201:CTRL
//! help
//! quit
//! ```
//!
//! Each command produces one or more output lines. Failures are reported as
//! `error: ...` and never end the session.

use std::fmt::Write as _;

use magsim_core::channel::{ChannelAccess, ChannelValue};
use magsim_core::observable::ObservableMetadata;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

const HELP: &str = "\
commands:
  get <channel>            read a channel
  put <channel> <value>    write a channel
  list [prefix]            list channels
  describe <channel>       show channel metadata
  help                     this text
  quit                     leave the console";

/// Result of one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Text to print. Empty for blank lines.
    Output(String),
    /// End the session.
    Quit,
}

/// Execute a single console line.
pub async fn execute_line(channels: &dyn ChannelAccess, line: &str) -> Response {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    let output = match verb.to_ascii_lowercase().as_str() {
        "" => String::new(),
        "quit" | "exit" => return Response::Quit,
        "help" | "?" => HELP.to_string(),
        "get" => match required(rest, "get <channel>") {
            Ok(name) => match channels.read(name) {
                Ok(value) => format!("{name} {value}"),
                Err(e) => format!("error: {e}"),
            },
            Err(usage) => usage,
        },
        "put" => match rest.split_once(char::is_whitespace) {
            Some((name, value)) => {
                let value = ChannelValue::parse_token(value.trim());
                match channels.write(name, value).await {
                    Ok(value) => format!("{name} {value}"),
                    Err(e) => format!("error: {e}"),
                }
            }
            None => "usage: put <channel> <value>".to_string(),
        },
        "list" => channels
            .channel_names()
            .into_iter()
            .filter(|name| name.starts_with(rest))
            .collect::<Vec<_>>()
            .join("\n"),
        "describe" => match required(rest, "describe <channel>") {
            Ok(name) => match channels.describe(name) {
                Ok(metadata) => render_metadata(&metadata),
                Err(e) => format!("error: {e}"),
            },
            Err(usage) => usage,
        },
        other => format!("error: unknown command '{other}' (try 'help')"),
    };

    Response::Output(output)
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str, String> {
    match rest.split_whitespace().next() {
        Some(arg) => Ok(arg),
        None => Err(format!("usage: {usage}")),
    }
}

fn render_metadata(metadata: &ObservableMetadata) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "name:        {}", metadata.name);
    let _ = writeln!(out, "type:        {}", metadata.dtype);
    let _ = write!(
        out,
        "access:      {}",
        if metadata.read_only { "read-only" } else { "read-write" }
    );
    if let Some(description) = &metadata.description {
        let _ = write!(out, "\ndescription: {description}");
    }
    if let Some(units) = &metadata.units {
        let _ = write!(out, "\nunits:       {units}");
    }
    if let (Some(min), Some(max)) = (metadata.min_value, metadata.max_value) {
        let _ = write!(out, "\nlimits:      {min} .. {max}");
    }
    if let Some(precision) = metadata.precision {
        let _ = write!(out, "\nprecision:   {precision}");
    }
    if !metadata.enum_values.is_empty() {
        let _ = write!(out, "\nchoices:     {}", metadata.enum_values.join(", "));
    }
    out
}

/// Run the console until `quit` or end of input.
pub async fn run<R, W>(channels: &dyn ChannelAccess, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        debug!(line = %line, "Console input");
        match execute_line(channels, &line).await {
            Response::Quit => break,
            Response::Output(text) if text.is_empty() => {}
            Response::Output(text) => {
                writer.write_all(text.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
    }
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use magsim_core::error::{SimError, SimResult};
    use magsim_core::observable::Observable;
    use parking_lot::Mutex;

    /// Two channels: a writable float and a read-only string.
    struct TwoChannels {
        value: Mutex<f64>,
        setpoint: Observable<f64>,
    }

    impl TwoChannels {
        fn new() -> Self {
            Self {
                value: Mutex::new(1.5),
                setpoint: Observable::new("DEV:A:1:SET", 1.5)
                    .with_units("kG")
                    .with_display_limits(-0.006, 0.006)
                    .with_precision(4),
            }
        }
    }

    #[async_trait]
    impl ChannelAccess for TwoChannels {
        fn channel_names(&self) -> Vec<String> {
            vec!["DEV:A:1:NAME".to_string(), "DEV:A:1:SET".to_string()]
        }

        fn read(&self, name: &str) -> SimResult<ChannelValue> {
            match name {
                "DEV:A:1:SET" => Ok((*self.value.lock()).into()),
                "DEV:A:1:NAME" => Ok("A1".into()),
                _ => Err(SimError::ChannelNotFound(name.to_string())),
            }
        }

        fn describe(&self, name: &str) -> SimResult<ObservableMetadata> {
            match name {
                "DEV:A:1:SET" => Ok(self.setpoint.metadata()),
                _ => Err(SimError::ChannelNotFound(name.to_string())),
            }
        }

        async fn write(&self, name: &str, value: ChannelValue) -> SimResult<ChannelValue> {
            match name {
                "DEV:A:1:SET" => {
                    let v = value.as_f64(name)?;
                    *self.value.lock() = v;
                    Ok(v.into())
                }
                "DEV:A:1:NAME" => Err(SimError::ChannelReadOnly(name.to_string())),
                _ => Err(SimError::ChannelNotFound(name.to_string())),
            }
        }
    }

    fn output(response: Response) -> String {
        match response {
            Response::Output(text) => text,
            Response::Quit => panic!("unexpected quit"),
        }
    }

    #[tokio::test]
    async fn test_get_and_put() {
        let channels = TwoChannels::new();
        assert_eq!(
            output(execute_line(&channels, "get DEV:A:1:SET").await),
            "DEV:A:1:SET 1.5"
        );
        assert_eq!(
            output(execute_line(&channels, "  put DEV:A:1:SET   -2.25 ").await),
            "DEV:A:1:SET -2.25"
        );
        assert_eq!(*channels.value.lock(), -2.25);
    }

    #[tokio::test]
    async fn test_errors_are_reported() {
        let channels = TwoChannels::new();
        assert!(output(execute_line(&channels, "get NOPE").await).starts_with("error:"));
        assert!(output(execute_line(&channels, "put DEV:A:1:NAME x").await).contains("read-only"));
        assert!(output(execute_line(&channels, "put DEV:A:1:SET abc").await).starts_with("error:"));
        assert_eq!(output(execute_line(&channels, "get").await), "usage: get <channel>");
        assert_eq!(output(execute_line(&channels, "put DEV:A:1:SET").await), "usage: put <channel> <value>");
        assert!(output(execute_line(&channels, "frobnicate").await).contains("unknown command"));
    }

    #[tokio::test]
    async fn test_list_describe_quit() {
        let channels = TwoChannels::new();
        assert_eq!(
            output(execute_line(&channels, "list").await),
            "DEV:A:1:NAME\nDEV:A:1:SET"
        );
        assert_eq!(output(execute_line(&channels, "list DEV:A:1:S").await), "DEV:A:1:SET");

        let described = output(execute_line(&channels, "describe DEV:A:1:SET").await);
        assert!(described.contains("units:       kG"));
        assert!(described.contains("limits:      -0.006 .. 0.006"));
        assert!(described.contains("precision:   4"));

        assert_eq!(execute_line(&channels, "QUIT").await, Response::Quit);
        assert_eq!(execute_line(&channels, "   ").await, Response::Output(String::new()));
    }

    #[tokio::test]
    async fn test_run_stops_at_quit() {
        let channels = TwoChannels::new();
        let input = b"get DEV:A:1:NAME\n\nput DEV:A:1:SET 3\nquit\nput DEV:A:1:SET 9\n";
        let mut out = Vec::new();

        run(&channels, &input[..], &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "DEV:A:1:NAME A1\nDEV:A:1:SET 3\n");
        assert_eq!(*channels.value.lock(), 3.0);
    }
}
