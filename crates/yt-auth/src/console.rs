use std::io::{BufRead, Write};

use async_trait::async_trait;

/// User-facing side of the interactive authorization
#[async_trait]
pub trait Console: Send + Sync {
    /// Show `message` and read one line of input
    async fn prompt_line(&self, message: &str) -> std::io::Result<String>;

    /// Show an informational message
    fn show(&self, message: &str);

    /// Open the user's default browser at `url`
    fn open_browser(&self, url: &str) -> std::io::Result<()>;
}

/// Console backed by stdin/stdout and the platform browser
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalConsole;

#[async_trait]
impl Console for TerminalConsole {
    async fn prompt_line(&self, message: &str) -> std::io::Result<String> {
        {
            let mut stdout = std::io::stdout().lock();
            write!(stdout, "{}", message)?;
            stdout.flush()?;
        }

        // Blocking read runs off the async workers
        tokio::task::spawn_blocking(read_line)
            .await
            .map_err(std::io::Error::other)?
    }

    fn show(&self, message: &str) {
        println!("{}", message);
    }

    fn open_browser(&self, url: &str) -> std::io::Result<()> {
        webbrowser::open(url)
    }
}

fn read_line() -> std::io::Result<String> {
    let mut line = String::new();
    let read = std::io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "standard input closed",
        ));
    }
    Ok(line)
}
