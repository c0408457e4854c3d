use anyhow::{Context, Result};
use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::warn;

use crate::cli::TokenMode;

/// Token length strategy, fixed for the whole run.
pub(crate) enum TokenCounter {
    Bpe(CoreBPE),
    Words,
}

impl TokenCounter {
    pub(crate) fn select(mode: TokenMode) -> Result<Self> {
        match mode {
            TokenMode::Words => Ok(Self::Words),
            TokenMode::Bpe => {
                let bpe = cl100k_base().context("failed to load cl100k_base encoding")?;
                Ok(Self::Bpe(bpe))
            }
            TokenMode::Auto => match cl100k_base() {
                Ok(bpe) => Ok(Self::Bpe(bpe)),
                Err(err) => {
                    warn!(error = %err, "cl100k_base unavailable; using word-count estimate");
                    Ok(Self::Words)
                }
            },
        }
    }

    pub(crate) fn count(&self, text: &str) -> usize {
        match self {
            Self::Bpe(bpe) => bpe.encode_with_special_tokens(text).len(),
            Self::Words => estimate_from_words(text),
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::Bpe(_) => "cl100k_base",
            Self::Words => "words*0.75",
        }
    }
}

fn estimate_from_words(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f64 * 0.75).round() as usize
}
