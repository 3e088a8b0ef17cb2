use std::process::ExitCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Success,
    Error,
}

/// Outcome of a command, with an optional closing message.
#[derive(Debug)]
pub struct Exit {
    status: Status,
    message: Option<String>,
}

impl Exit {
    pub fn success() -> Self {
        Self {
            status: Status::Success,
            message: None,
        }
    }

    pub fn error() -> Self {
        Self {
            status: Status::Error,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Print the message, errors to stderr, and convert to a process exit code.
    pub fn report(self) -> ExitCode {
        match self.status {
            Status::Success => {
                if let Some(message) = self.message {
                    println!("{message}");
                }
                ExitCode::SUCCESS
            }
            Status::Error => {
                if let Some(message) = self.message {
                    eprintln!("{message}");
                }
                ExitCode::FAILURE
            }
        }
    }
}
