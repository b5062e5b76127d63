use std::io::{self, Stdout, Write};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::ExecutableCommand;

use super::{TurnInterface, TurnOutput};

/// Characters written between typewriter pauses.
const TYPEWRITER_CHUNK: usize = 5;

/// Renders turn output to a terminal (or any writer).
pub struct TerminalOutput<W: Write + Send = Stdout> {
    writer: W,
    typewriter: Option<Duration>,
    color: bool,
}

impl TerminalOutput<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalOutput<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            typewriter: None,
            color: false,
        }
    }

    /// Pause for `delay` after every few characters of an answer.
    pub fn with_typewriter(mut self, delay: Option<Duration>) -> Self {
        self.typewriter = delay.filter(|d| !d.is_zero());
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn line(&mut self, color: Color, text: &str) -> io::Result<()> {
        if self.color {
            self.writer.execute(SetForegroundColor(color))?;
        }
        writeln!(self.writer, "{}", text)?;
        if self.color {
            self.writer.execute(ResetColor)?;
        }
        self.writer.flush()
    }

    async fn answer(&mut self, text: &str) -> io::Result<()> {
        if self.color {
            self.writer.execute(SetForegroundColor(Color::Cyan))?;
        }
        writeln!(self.writer, "🤖 助手:")?;
        if self.color {
            self.writer.execute(ResetColor)?;
        }

        match self.typewriter {
            Some(delay) => {
                for (i, ch) in text.chars().enumerate() {
                    write!(self.writer, "{}", ch)?;
                    if i % TYPEWRITER_CHUNK == 0 {
                        self.writer.flush()?;
                        tokio::time::sleep(delay).await;
                    }
                }
                writeln!(self.writer)?;
            }
            None => writeln!(self.writer, "{}", text)?,
        }
        writeln!(self.writer)?;
        self.writer.flush()
    }
}

#[async_trait]
impl<W: Write + Send> TurnInterface for TerminalOutput<W> {
    async fn emit(&mut self, output: TurnOutput) -> Result<()> {
        match output {
            TurnOutput::Status(msg) => self.line(Color::DarkGrey, &msg)?,
            TurnOutput::Step(step) => self.line(Color::Yellow, &step)?,
            TurnOutput::Answer(answer) => self.answer(&answer).await?,
            TurnOutput::Error(msg) => self.line(Color::Red, &msg)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(output: TerminalOutput<Vec<u8>>) -> String {
        String::from_utf8(output.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn test_plain_rendering() {
        let mut out = TerminalOutput::new(Vec::new());
        out.emit(TurnOutput::Step("🌐 正在搜索Apple官方文档...".into()))
            .await
            .unwrap();
        out.emit(TurnOutput::Answer("你好".into())).await.unwrap();

        assert_eq!(rendered(out), "🌐 正在搜索Apple官方文档...\n🤖 助手:\n你好\n\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_typewriter_writes_whole_answer() {
        let text = "打开设置，然后轻点蓝牙。";
        let mut out =
            TerminalOutput::new(Vec::new()).with_typewriter(Some(Duration::from_millis(50)));
        out.emit(TurnOutput::Answer(text.into())).await.unwrap();

        assert_eq!(rendered(out), format!("🤖 助手:\n{text}\n\n"));
    }

    #[test]
    fn test_zero_delay_disables_typewriter() {
        let out = TerminalOutput::new(Vec::new()).with_typewriter(Some(Duration::ZERO));
        assert!(out.typewriter.is_none());
    }
}
