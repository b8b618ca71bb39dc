//! The external print action.

use std::future::Future;
use std::process::ExitStatus;

/// Errors from one print attempt. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum PrintError {
    #[error("print command is empty")]
    EmptyCommand,

    #[error("failed to spool label: {0}")]
    Spool(std::io::Error),

    #[error("failed to run print command: {0}")]
    Launch(std::io::Error),

    #[error("print command exited with {0}")]
    Failed(ExitStatus),
}

/// Sends one rendered label to a printer.
pub trait PrintAction: Send + Sync {
    fn print(&self, label: &str) -> impl Future<Output = Result<(), PrintError>> + Send;
}

/// Spools the label to a temp file and runs a command on it, `lp -o raw` by default.
#[derive(Debug, Clone)]
pub struct CommandPrinter {
    program: String,
    args: Vec<String>,
}

impl CommandPrinter {
    /// Build from a whitespace separated command line.
    pub fn from_command(command: &str) -> Result<Self, PrintError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(PrintError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl PrintAction for CommandPrinter {
    async fn print(&self, label: &str) -> Result<(), PrintError> {
        let spool = tempfile::Builder::new()
            .prefix("label")
            .suffix(".zpl")
            .tempfile()
            .map_err(PrintError::Spool)?;
        tokio::fs::write(spool.path(), label)
            .await
            .map_err(PrintError::Spool)?;

        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(spool.path())
            .status()
            .await
            .map_err(PrintError::Launch)?;

        if status.success() {
            Ok(())
        } else {
            Err(PrintError::Failed(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_is_split() {
        let printer = CommandPrinter::from_command("lp -o raw").unwrap();
        assert_eq!(printer.program(), "lp");
        assert_eq!(printer.args(), ["-o".to_string(), "raw".to_string()]);
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            CommandPrinter::from_command("   "),
            Err(PrintError::EmptyCommand)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn label_file_is_passed_to_command() {
        let printer = CommandPrinter::from_command("test -s").unwrap();
        printer.print("^XA^XZ").await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_an_error() {
        let printer = CommandPrinter::from_command("false").unwrap();
        assert!(matches!(
            printer.print("^XA^XZ").await,
            Err(PrintError::Failed(_))
        ));
    }
}
