//! Terminal rendering of the loop and line-based operator input.

use std::io::{self, Write};

use async_trait::async_trait;
use tandem_agent::{AggregatedToolCall, InterruptReport, LoopReport, Operator, TurnSink};
use tandem_core::error::GateError;
use tandem_core::stream::ChunkRole;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const BANNER_WIDTH: usize = 41;
const ANSWER_PREFIX: &str = "answer: ";
const TOOL_PREFIX: &str = "tool response: ";

/// Boxed section heading.
pub fn banner(title: &str) -> String {
    let inner = BANNER_WIDTH - 2;
    let title = format!("{title:^inner$}");
    format!(
        "╔{line}╗\n║{title}║\n╚{line}╝",
        line = "═".repeat(inner)
    )
}

/// Renders every loop report to a writer, stdout by default.
pub struct ConsoleSink<W: Write + Send = io::Stdout> {
    out: W,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    // Terminal write failures are not worth stopping the loop for.
    fn emit(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

impl<W: Write + Send> TurnSink for ConsoleSink<W> {
    fn event_started(&mut self, agent: &str, run_path: &[String]) {
        self.emit(&format!("name: {agent}\npath: {}", run_path.join(" -> ")));
    }

    fn text_started(&mut self, role: ChunkRole) -> usize {
        let prefix = match role {
            ChunkRole::Tool => TOOL_PREFIX,
            ChunkRole::Normal => ANSWER_PREFIX,
        };
        self.emit(&format!("\n{prefix}"));
        prefix.chars().count()
    }

    fn text(&mut self, delta: &str, wrap_before: bool) {
        if wrap_before {
            self.emit("\n");
        }
        self.emit(delta);
    }

    fn tool_calls(&mut self, calls: &[AggregatedToolCall]) {
        for call in calls {
            self.emit(&format!(
                "\ntool name: {}\narguments: {}",
                call.name, call.arguments
            ));
        }
    }

    fn transfer(&mut self, dest: &str) {
        self.emit(&format!("\naction: transfer to {dest}"));
    }

    fn interrupted(&mut self, report: &InterruptReport) {
        for point in &report.points {
            self.emit(&format!("\ninterrupted [{}]: {}", point.position, point.description));
        }
    }

    fn exit(&mut self) {
        self.emit("\naction: exit");
    }

    fn error(&mut self, message: &str) {
        self.emit(&format!("\nerror: {message}"));
    }

    fn event_finished(&mut self) {
        self.emit("\n\n");
    }

    fn details(&mut self, answer: &str) {
        self.emit(&format!("\n{}\n{answer}\n\n", banner("Full output")));
    }

    fn notice(&mut self, message: &str) {
        self.emit(&format!("\n✓ {message}\n"));
    }

    fn finished(&mut self, report: &LoopReport) {
        let marker = if report.reason.is_failure() { "❌" } else { "✓" };
        self.emit(&format!(
            "\n{marker} Loop ended after {} turn(s): {}\n{}\n",
            report.turns,
            report.reason.describe(),
            banner("Final result")
        ));
        if !report.answer.is_empty() {
            self.emit(&format!("{}\n", report.answer));
        }
    }
}

/// Reads operator input from stdin, one line at a time.
pub struct StdinOperator {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinOperator {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinOperator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for StdinOperator {
    async fn show(&mut self, text: &str) -> Result<(), GateError> {
        let mut out = io::stdout();
        writeln!(out, "\n{text}").map_err(|e| GateError::Io(e.to_string()))?;
        out.flush().map_err(|e| GateError::Io(e.to_string()))
    }

    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>, GateError> {
        {
            let mut out = io::stdout();
            write!(out, "{prompt} ").map_err(|e| GateError::Io(e.to_string()))?;
            out.flush().map_err(|e| GateError::Io(e.to_string()))?;
        }
        self.lines
            .next_line()
            .await
            .map_err(|e| GateError::Io(e.to_string()))
    }
}
