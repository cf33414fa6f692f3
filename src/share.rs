//! Referral Link and Share Actions
//!
//! Copying the referral link to the clipboard, the confirmation toast that
//! follows, and the fixed social share targets.

use serde::Serialize;
use std::io::Write;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Social network a referral link can be shared on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShareTarget {
    Facebook,
    Twitter,
    Instagram,
}

impl ShareTarget {
    pub const ALL: [ShareTarget; 3] = [
        ShareTarget::Facebook,
        ShareTarget::Twitter,
        ShareTarget::Instagram,
    ];

    pub fn url(&self) -> &'static str {
        match self {
            ShareTarget::Facebook => "https://facebook.com",
            ShareTarget::Twitter => "https://twitter.com",
            ShareTarget::Instagram => "https://instagram.com",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShareTarget::Facebook => "Facebook",
            ShareTarget::Twitter => "Twitter",
            ShareTarget::Instagram => "Instagram",
        }
    }

    /// Button label
    pub fn label(&self) -> String {
        format!("Share on {}", self.name())
    }
}

impl std::fmt::Display for ShareTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Rendered share button
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareLink {
    pub label: String,
    pub url: String,
}

impl From<ShareTarget> for ShareLink {
    fn from(target: ShareTarget) -> Self {
        Self {
            label: target.label(),
            url: target.url().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    Success,
    Error,
}

/// A transient notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
}

impl Toast {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: ToastVariant::Success,
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: ToastVariant::Error,
        }
    }
}

impl std::fmt::Display for Toast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

/// Clipboard errors
#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("No clipboard program available")]
    Unavailable,

    #[error("Clipboard program {program} failed: {message}")]
    Command { program: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Somewhere text can be copied to
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Shows toasts to the user
pub trait Notifier: Send + Sync {
    fn notify(&self, toast: Toast);
}

/// The user's shareable referral link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ReferralLink(String);

impl ReferralLink {
    pub fn new(link: impl Into<String>) -> Self {
        Self(link.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Copy the link and confirm with a toast.
    ///
    /// Best effort: a clipboard failure is logged and shown as an error
    /// toast, never returned. Returns whether the copy succeeded.
    pub fn copy(&self, clipboard: &dyn Clipboard, notifier: &dyn Notifier) -> bool {
        match clipboard.write_text(&self.0) {
            Ok(()) => {
                tracing::info!(link = %self.0, "Referral link copied");
                notifier.notify(Toast::success(
                    "Link copied!",
                    "Your referral link has been copied to clipboard.",
                ));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to copy referral link");
                notifier.notify(Toast::error("Copy failed", e.to_string()));
                false
            }
        }
    }
}

impl std::fmt::Display for ReferralLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Clipboard backed by the platform's copy command.
///
/// Tries each program in order and uses the first one installed.
pub struct CommandClipboard {
    programs: Vec<(String, Vec<String>)>,
}

impl Default for CommandClipboard {
    fn default() -> Self {
        let programs: &[(&str, &[&str])] = &[
            ("wl-copy", &[]),
            ("xclip", &["-selection", "clipboard"]),
            ("xsel", &["--clipboard", "--input"]),
            ("pbcopy", &[]),
            ("clip", &[]),
        ];
        Self::with_programs(programs.iter().map(|(program, args)| {
            (
                program.to_string(),
                args.iter().map(|a| a.to_string()).collect(),
            )
        }))
    }
}

impl CommandClipboard {
    pub fn with_programs(programs: impl IntoIterator<Item = (String, Vec<String>)>) -> Self {
        Self {
            programs: programs.into_iter().collect(),
        }
    }

    fn run(program: &str, args: &[String], text: &str) -> Result<(), ClipboardError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ClipboardError::Command {
                program: program.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Clipboard for CommandClipboard {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        for (program, args) in &self.programs {
            match Self::run(program, args, text) {
                Ok(()) => {
                    tracing::debug!(program = %program, "Copied to clipboard");
                    return Ok(());
                }
                Err(ClipboardError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(ClipboardError::Unavailable)
    }
}

/// Prints toasts on the terminal
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, toast: Toast) {
        match toast.variant {
            ToastVariant::Success => println!("{}", toast),
            ToastVariant::Error => eprintln!("{}", toast),
        }
    }
}
