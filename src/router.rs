//! Model routing: caller-facing model names to upstream Cloud Code model IDs.
//!
//! IDE clients offer their own model pickers (OpenAI names in Cursor, Claude
//! names in Claude Code, plain Gemini names elsewhere). The static table maps
//! each caller name to the upstream ID, the signature-compatibility family,
//! and whether thinking is on by default. A process-wide toggle widens the
//! context window of Gemini routes by substituting the `[1m]`-suffixed
//! upstream ID.

use crate::error::{ProxyError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy)]
pub struct ModelRoute {
    pub upstream_id: &'static str,
    pub family: &'static str,
    pub enable_thinking: bool,
    pub supports_1m_context: bool,
}

const fn route(
    upstream_id: &'static str,
    family: &'static str,
    enable_thinking: bool,
    supports_1m_context: bool,
) -> ModelRoute {
    ModelRoute {
        upstream_id,
        family,
        enable_thinking,
        supports_1m_context,
    }
}

static ROUTES: Lazy<HashMap<&'static str, ModelRoute>> = Lazy::new(|| {
    let mut m = HashMap::new();

    // OpenAI names the IDE pickers offer
    m.insert("gpt-4", route("gemini-2.5-flash", "gemini-2.5", false, false));
    m.insert("gpt-4-turbo", route("gemini-2.5-flash", "gemini-2.5", false, false));
    m.insert("gpt-4o", route("gemini-2.5-flash", "gemini-2.5", false, false));
    m.insert("gpt-4o-mini", route("gemini-2.5-flash", "gemini-2.5", false, false));
    m.insert("gpt-3.5-turbo", route("gemini-2.5-flash", "gemini-2.5", false, false));
    m.insert("o3", route("gemini-3-pro-high", "gemini-3", true, true));
    m.insert("o4-mini", route("gemini-3-flash", "gemini-3", true, true));

    // Claude aliases
    m.insert(
        "claude-sonnet-4-5",
        route("claude-sonnet-4-5", "claude", false, false),
    );
    m.insert(
        "claude-sonnet-4-5-thinking",
        route("claude-sonnet-4-5-thinking", "claude", true, false),
    );
    m.insert(
        "claude-opus-4-5-thinking",
        route("claude-opus-4-5-thinking", "claude", true, false),
    );
    m.insert(
        "claude-3-5-sonnet-20241022",
        route("claude-sonnet-4-5", "claude", false, false),
    );
    m.insert(
        "claude-3-5-haiku-20241022",
        route("gemini-2.5-flash", "gemini-2.5", false, false),
    );

    // Gemini names
    m.insert(
        "gemini-2.5-flash",
        route("gemini-2.5-flash", "gemini-2.5", false, false),
    );
    m.insert(
        "gemini-2.5-flash-thinking",
        route("gemini-2.5-flash-thinking", "gemini-2.5", true, false),
    );
    m.insert("gemini-3-flash", route("gemini-3-flash", "gemini-3", true, true));
    m.insert("gemini-3-pro", route("gemini-3-pro-high", "gemini-3", true, true));
    m.insert(
        "gemini-3-pro-preview",
        route("gemini-3-pro-high", "gemini-3", true, true),
    );
    m.insert(
        "gemini-3-pro-low",
        route("gemini-3-pro-low", "gemini-3", true, true),
    );
    m.insert(
        "gemini-3-pro-high",
        route("gemini-3-pro-high", "gemini-3", true, true),
    );

    m
});

/// A resolved route for one request.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub upstream_id: String,
    pub family: &'static str,
    pub enable_thinking: bool,
}

pub struct ModelRouter {
    wide_context: AtomicBool,
    fallback: bool,
    default_model: String,
}

impl ModelRouter {
    pub fn new(fallback: bool, default_model: impl Into<String>) -> Self {
        Self {
            wide_context: AtomicBool::new(false),
            fallback,
            default_model: default_model.into(),
        }
    }

    /// Toggle the 1M-context substitution for Gemini routes that support it.
    pub fn set_wide_context(&self, enabled: bool) {
        self.wide_context.store(enabled, Ordering::Relaxed);
    }

    pub fn wide_context(&self) -> bool {
        self.wide_context.load(Ordering::Relaxed)
    }

    /// Resolve a caller-facing model name. Unknown names fail with 400 unless
    /// fallback mode routes them to the configured default model.
    pub fn resolve(&self, caller_model: &str) -> Result<Resolved> {
        let route = ROUTES
            .get(caller_model)
            .or_else(|| {
                if self.fallback {
                    tracing::warn!(
                        model = caller_model,
                        fallback = %self.default_model,
                        "unknown model, using fallback"
                    );
                    ROUTES.get(self.default_model.as_str())
                } else {
                    None
                }
            })
            .ok_or_else(|| {
                ProxyError::bad_request(
                    "unknown_model",
                    format!("model '{caller_model}' is not available"),
                )
            })?;

        let upstream_id = if route.supports_1m_context && self.wide_context() {
            format!("{}[1m]", route.upstream_id)
        } else {
            route.upstream_id.to_string()
        };

        Ok(Resolved {
            upstream_id,
            family: route.family,
            enable_thinking: route.enable_thinking,
        })
    }

    /// Caller-facing names for the models listing endpoint, sorted.
    pub fn caller_models() -> Vec<&'static str> {
        let mut names: Vec<_> = ROUTES.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
