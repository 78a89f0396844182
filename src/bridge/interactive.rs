//! Interactive flows that need an answer from the operator.

use std::path::PathBuf;

use crate::bridge::formatter;
use crate::bridge::prompt::{Resolution, Resolve};
use crate::common::{CompactId, ImAction, TransferId};

/// A question put to the operator, with the context needed to act on the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Login is blocked on a CAPTCHA stored at `image_path`.
    VerifyCode { image_path: PathBuf },
    /// Someone offered a file.
    FileConsent {
        transfer: TransferId,
        sender: String,
        sender_id: CompactId,
        file_name: String,
    },
}

impl Prompt {
    pub fn tip(&self) -> String {
        match self {
            Self::VerifyCode { image_path } => formatter::system(&format!(
                "Verification code required, enter the code shown in {}",
                image_path.display()
            )),
            Self::FileConsent {
                sender,
                sender_id,
                file_name,
                ..
            } => formatter::file_offer(sender, *sender_id, file_name),
        }
    }

    /// Notice sent when the sender withdraws the offer.
    pub fn withdrawn_notice(&self) -> String {
        match self {
            Self::FileConsent {
                sender, file_name, ..
            } => formatter::system(&format!("{} cancelled sending {}", sender, file_name)),
            Self::VerifyCode { .. } => formatter::system("Verification request withdrawn"),
        }
    }

    pub fn transfer(&self) -> Option<TransferId> {
        match self {
            Self::FileConsent { transfer, .. } => Some(*transfer),
            Self::VerifyCode { .. } => None,
        }
    }
}

fn is_yes(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

impl Resolve for Prompt {
    type Action = ImAction;

    fn resolve(&self, input: &str) -> Resolution<ImAction> {
        match self {
            Self::VerifyCode { .. } => {
                let code = input.trim();
                if code.is_empty() {
                    return Resolution::retry(formatter::system(
                        "Verification code cannot be empty",
                    ));
                }
                Resolution::accept("").with_action(ImAction::SubmitVerifyCode {
                    code: code.to_string(),
                })
            }
            Self::FileConsent {
                transfer,
                file_name,
                ..
            } => {
                if is_yes(input) {
                    Resolution::accept(formatter::system(&format!("Receiving {}...", file_name)))
                        .with_action(ImAction::AcceptFile {
                            transfer: *transfer,
                        })
                } else {
                    Resolution::accept(formatter::system(&format!(
                        "Cancelled receiving {}",
                        file_name
                    )))
                    .with_action(ImAction::RejectFile {
                        transfer: *transfer,
                    })
                }
            }
        }
    }
}
