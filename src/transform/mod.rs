//! Message transform pipeline applied before every completion call.
//!
//! A [`Pipeline`] pairs an optional async transform over the full history
//! (windowing, filtering) with a conversion to the LLM-visible subset.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use crate::error::Result;
pub use crate::types::convert_to_llm;
use crate::types::{orphan_tool_results, LlmMessage, Message, Role};

/// Async history transform.
pub type TransformFn = Arc<dyn Fn(Vec<Message>) -> BoxFuture<'static, Result<Vec<Message>>> + Send + Sync>;

/// Conversion from history to backend-ready messages.
pub type ConvertFn = Arc<dyn Fn(&[Message]) -> Vec<LlmMessage> + Send + Sync>;

/// Transform followed by conversion.
#[derive(Clone)]
pub struct Pipeline {
    transform: Option<TransformFn>,
    convert: ConvertFn,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            transform: None,
            convert: Arc::new(convert_to_llm),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("transform", &self.transform.as_ref().map(|_| ".."))
            .finish()
    }
}

impl Pipeline {
    pub fn new(transform: Option<TransformFn>, convert: ConvertFn) -> Self {
        Self { transform, convert }
    }

    /// Default conversion with the given transform in front.
    pub fn with_transform(transform: TransformFn) -> Self {
        Self {
            transform: Some(transform),
            ..Self::default()
        }
    }

    /// Run the transform (if any), then convert.
    pub async fn run(&self, messages: Vec<Message>) -> Result<Vec<LlmMessage>> {
        let messages = match &self.transform {
            Some(transform) => transform(messages).await?,
            None => messages,
        };
        let orphans = orphan_tool_results(&messages);
        if !orphans.is_empty() {
            warn!(ids = ?orphans, "tool results without a matching tool call");
        }
        Ok((self.convert)(&messages))
    }
}

/// Keep only the last `n` messages.
pub fn keep_recent(n: usize) -> TransformFn {
    Arc::new(move |mut messages: Vec<Message>| -> BoxFuture<'static, Result<Vec<Message>>> {
        Box::pin(async move {
            if messages.len() > n {
                messages.drain(..messages.len() - n);
            }
            Ok(messages)
        })
    })
}

/// Keep the first message plus the last `n`.
pub fn keep_first_and_recent(n: usize) -> TransformFn {
    Arc::new(move |messages: Vec<Message>| -> BoxFuture<'static, Result<Vec<Message>>> {
        Box::pin(async move {
            if messages.len() <= n {
                return Ok(messages);
            }
            let tail_start = messages.len() - n;
            let mut kept = Vec::with_capacity(n + 1);
            let mut iter = messages.into_iter();
            kept.extend(iter.next());
            kept.extend(iter.skip(tail_start - 1));
            Ok(kept)
        })
    })
}

/// Remove every message whose role is in `roles`.
pub fn drop_roles(roles: &[Role]) -> TransformFn {
    let roles: HashSet<Role> = roles.iter().copied().collect();
    Arc::new(move |messages: Vec<Message>| -> BoxFuture<'static, Result<Vec<Message>>> {
        let roles = roles.clone();
        Box::pin(async move {
            Ok(messages
                .into_iter()
                .filter(|m| !roles.contains(&m.role()))
                .collect())
        })
    })
}

/// Apply transforms left to right, stopping at the first error.
pub fn chain(transforms: Vec<TransformFn>) -> TransformFn {
    Arc::new(move |messages: Vec<Message>| -> BoxFuture<'static, Result<Vec<Message>>> {
        let transforms = transforms.clone();
        Box::pin(async move {
            let mut current = messages;
            for transform in &transforms {
                current = transform(current).await?;
            }
            Ok(current)
        })
    })
}
