use std::io::BufRead;
use std::sync::mpsc;
use std::thread;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    Reconnect,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "q" | "quit" | "exit" | "\u{1b}" => Some(Command::Quit),
            "i" | "reinit" | "reconnect" => Some(Command::Reconnect),
            _ => None,
        }
    }
}

/// Read console commands on a background thread. At end of input the reader
/// stops and the relay keeps running; stop it with a signal instead.
pub fn spawn_console_reader() -> mpsc::Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match Command::parse(&line) {
                Some(cmd) => {
                    if tx.send(cmd).is_err() {
                        return;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!(command = line.trim(), "unknown command; use quit or reinit"),
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse(" QUIT \n"), Some(Command::Quit));
        assert_eq!(Command::parse("\u{1b}"), Some(Command::Quit));
        assert_eq!(Command::parse("i"), Some(Command::Reconnect));
        assert_eq!(Command::parse("reinit"), Some(Command::Reconnect));
        assert_eq!(Command::parse("jump"), None);
        assert_eq!(Command::parse(""), None);
    }
}
