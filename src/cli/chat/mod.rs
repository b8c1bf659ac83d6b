pub mod conversation_state;
pub mod prompt;
pub mod turn;

use std::io::Write;
use std::mem;
use std::process::ExitCode;
use std::sync::Arc;

use color_print::cformat;
use conversation_state::{ConversationState, Role, StoreEvent};
use crossterm::cursor::MoveToColumn;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use eyre::Result;
use prompt::generate_prompt;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error};
use turn::{SubmitOutcome, TurnController};

use crate::inference::InferenceClient;

const WELCOME_TEXT: &str = "
嘿呀，回來啦？跟媽媽說說今天過得怎麼樣。

/help         Show the help dialogue
/quit         Quit the application
";

const HELP_TEXT: &str = "
Mom Chat CLI

Type a message and press Enter to talk to mom.

/help         Show this help dialogue
/quit         Quit the application
";

const PENDING_TEXT: &str = "AI媽媽正在回應中...";

const BUSY_TEXT: &str = "媽媽還在回你上一句，等一下喔。";

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    turns: TurnController,
    events: UnboundedReceiver<StoreEvent>,
    indicator_shown: bool,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        client: Arc<dyn InferenceClient>,
    ) -> Self {
        let (listener, events) = mpsc::unbounded_channel();
        Self {
            output,
            input,
            interactive,
            turns: TurnController::new(client, ConversationState::with_listener(listener)),
            events,
            indicator_shown: false,
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        // Handle non-interactive mode (single query)
        if let Some(input) = self.input.take() {
            let result = self.process_chat_input(&input).await;
            self.turns.dispose();
            result?;
            return Ok(ExitCode::SUCCESS);
        }

        if self.interactive {
            writeln!(self.output, "{}", WELCOME_TEXT)?;
            let result = self.run_interactive().await;
            self.turns.dispose();
            debug!("Session closed after {} messages", self.turns.messages().len());
            result?;
        }

        Ok(ExitCode::SUCCESS)
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let prompt_text = generate_prompt(None);

            match rl.readline(&prompt_text) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    rl.add_history_entry(line.as_str());

                    match line.trim() {
                        "/quit" => break,
                        "/help" => writeln!(self.output, "{}", HELP_TEXT)?,
                        _ => {
                            if let Err(e) = self.process_chat_input(&line).await {
                                writeln!(self.output, "Error: {}", e)?;
                            }
                        }
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    /// Submit one turn, rendering store events while the reply is pending.
    async fn process_chat_input(&mut self, input: &str) -> Result<()> {
        let Self {
            output,
            interactive,
            turns,
            events,
            indicator_shown,
            ..
        } = self;
        let interactive = *interactive;

        let submit = turns.submit(input);
        tokio::pin!(submit);

        let outcome = loop {
            tokio::select! {
                outcome = &mut submit => break outcome,
                Some(event) = events.recv() => {
                    render_event(output, indicator_shown, interactive, event)?;
                }
            }
        };

        while let Ok(event) = events.try_recv() {
            render_event(output, indicator_shown, interactive, event)?;
        }

        debug!(
            "Turn finished: {:?}, {} messages in conversation",
            outcome,
            turns.snapshot().messages.len()
        );
        if outcome == SubmitOutcome::Busy {
            writeln!(output, "{}", BUSY_TEXT)?;
        }

        Ok(())
    }
}

/// In interactive mode the user already sees their own line, and the
/// pending indicator is drawn. Otherwise the output may be a pipe, so the
/// user's line is echoed and no cursor control is written.
fn render_event<W: Write>(
    output: &mut W,
    indicator_shown: &mut bool,
    interactive: bool,
    event: StoreEvent,
) -> Result<()> {
    match event {
        StoreEvent::PendingChanged(true) if interactive => {
            write!(output, "{}", cformat!("<dim>{}</>", PENDING_TEXT))?;
            output.flush()?;
            *indicator_shown = true;
        }
        StoreEvent::PendingChanged(true) => {}
        StoreEvent::PendingChanged(false) => clear_indicator(output, indicator_shown)?,
        StoreEvent::Appended(message) => {
            clear_indicator(output, indicator_shown)?;
            match message.role() {
                Role::User if !interactive => {
                    writeln!(output, "{}", cformat!("<cyan,bold>你：</>{}", message.text()))?;
                }
                Role::User => {}
                Role::Assistant => {
                    writeln!(output, "{}", cformat!("<magenta,bold>媽媽：</>{}", message.text()))?;
                }
            }
        }
    }

    Ok(())
}

fn clear_indicator<W: Write>(output: &mut W, indicator_shown: &mut bool) -> Result<()> {
    if mem::take(indicator_shown) {
        execute!(output, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    }
    Ok(())
}
