use log::{debug, warn};

use super::args::Args;
use crate::{
    core::{ChatError, ChatSession, Config, Tool, UsageTracker},
    providers::{ChatBackend, FunctionClient},
};
use std::io::{self, Write};
use std::process::ExitCode;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const API_KEY_VAR: &str = "FUNCTIONS_API_KEY";
const PROMPT: &str = "> ";
const EXIT_COMMAND: &str = "/exit";
const RESET_COMMAND: &str = "/reset";

/// Creates the client for the configured tool.
///
/// # Arguments
/// * `config` - The loaded configuration
/// * `tool` - The tool whose function should be called
///
/// # Returns
/// A boxed backend implementing the `ChatBackend` trait
fn create_client(config: &Config, tool: Tool) -> Result<Box<dyn ChatBackend>, ChatError> {
    let api_key = dotenv::var(API_KEY_VAR)
        .or_else(|_| std::env::var(API_KEY_VAR))
        .map_err(|_| {
            ChatError::ConfigError(format!("{API_KEY_VAR} not set in .env or environment"))
        })?;
    let client = FunctionClient::new(api_key, config, tool)?;
    debug!("[Client] {tool} -> {url}", url = client.url());
    Ok(Box::new(client))
}

/// Ctrl-C presses for the whole session.
///
/// A single listener is installed up front. Once it exists the process no
/// longer dies on SIGINT, so every wait for input or for a reply has to
/// watch these presses itself.
struct Interrupts {
    rx: mpsc::UnboundedReceiver<()>,
}

impl Interrupts {
    fn listen() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
        Self::from_receiver(rx)
    }

    fn from_receiver(rx: mpsc::UnboundedReceiver<()>) -> Self {
        Self { rx }
    }

    /// Waits for the next press. Never resolves once the listener is gone.
    async fn recv(&mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    /// Forgets presses that arrived while nothing was waiting for them.
    fn clear(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

/// What the prompt produced.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Line(String),
    Interrupted,
    Eof,
}

async fn next_input<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
    interrupts: &mut Interrupts,
) -> Result<Input, ChatError> {
    tokio::select! {
        line = lines.next_line() => Ok(line?.map_or(Input::Eof, Input::Line)),
        () = interrupts.recv() => Ok(Input::Interrupted),
    }
}

/// One message and its reply, with quota and Ctrl-C handling around it.
struct Exchange<'a> {
    session: &'a mut ChatSession,
    usage: &'a mut UsageTracker,
    interrupts: Interrupts,
    tool: Tool,
    daily_limit: u32,
}

impl Exchange<'_> {
    async fn send<W: Write + Send>(
        &mut self,
        query: String,
        writer: &mut W,
    ) -> Result<(), ChatError> {
        self.usage.check(self.tool, self.daily_limit)?;
        self.interrupts.clear();

        let cancel = CancellationToken::new();
        let result = {
            let send = self.session.send(query, writer, &cancel);
            tokio::pin!(send);
            loop {
                tokio::select! {
                    result = &mut send => break result,
                    () = self.interrupts.recv() => cancel.cancel(),
                }
            }
        };

        let message = result?;
        // a failed save must not fail an exchange the user already saw
        match self.usage.record(self.tool) {
            Ok(used) => debug!(
                "[Exchange] {} bytes received, {used} messages used today",
                message.len()
            ),
            Err(e) => warn!("failed to save usage: {e}"),
        }
        Ok(())
    }
}

fn report_failure(err: &ChatError) {
    eprintln!("\nfailed to get response: {err}");
}

pub async fn run(args: Args) -> Result<ExitCode, ChatError> {
    let _ = dotenv::dotenv();

    let mut config = Config::load()?;
    if let Some(tool) = args.tool {
        config.update_tool(tool);
    }
    let tool = config.default_tool;
    let daily_limit = config.tool_config(tool).daily_limit;

    let query = args.query();
    if query.is_none() && !args.interactive {
        return Err(ChatError::ConfigError("Query must not be empty".to_string()));
    }

    debug!(
        "[SETTINGS] tool: {tool}, daily_limit: {daily_limit}, interactive: {}",
        args.interactive
    );

    let mut session = ChatSession::new(create_client(&config, tool)?);
    let mut usage = UsageTracker::load(&config.usage_file)?;
    let mut exchange = Exchange {
        session: &mut session,
        usage: &mut usage,
        interrupts: Interrupts::listen(),
        tool,
        daily_limit,
    };
    let mut stdout = io::stdout();

    if let Some(query) = query {
        let result = exchange.send(query, &mut stdout).await;
        writeln!(&mut stdout)?;
        if let Err(e) = result {
            report_failure(&e);
            if !args.interactive {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    if args.interactive {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            write!(&mut stdout, "{PROMPT}")?;
            stdout.flush()?;

            let line = match next_input(&mut lines, &mut exchange.interrupts).await? {
                Input::Line(line) => line,
                Input::Interrupted | Input::Eof => {
                    writeln!(&mut stdout)?;
                    break;
                }
            };
            match line.trim() {
                "" => continue,
                EXIT_COMMAND => break,
                RESET_COMMAND => {
                    exchange.session.reset();
                    continue;
                }
                query => {
                    let result = exchange.send(query.to_string(), &mut stdout).await;
                    writeln!(&mut stdout)?;
                    if let Err(e) = result {
                        report_failure(&e);
                    }
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
