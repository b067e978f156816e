// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trace identity: trace/span ids and the immutable [`TraceContext`].
//!
//! Ids follow the W3C Trace Context shape (32 hex chars for a trace, 16 for a
//! span) and are drawn from the OS random source via `uuid` v4.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 128-bit trace identifier, rendered as 32 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

impl TraceId {
    /// Generate a new random trace id.
    pub fn new() -> Self {
        // All-zero is invalid per W3C; v4 uuids always carry version bits.
        Self(Uuid::new_v4().as_u128())
    }

    /// Parse from 32 hex characters.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 32 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u128::from_str_radix(s, 16).ok().filter(|v| *v != 0).map(Self)
    }

    /// Get a short representation (first 8 characters).
    pub fn short(&self) -> String {
        self.to_string()[..8].to_string()
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self.short())
    }
}

/// A 64-bit span identifier, rendered as 16 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Generate a new random span id.
    pub fn new() -> Self {
        loop {
            let id = Uuid::new_v4().as_u64_pair().0;
            if id != 0 {
                return Self(id);
            }
        }
    }

    /// Parse from 16 hex characters.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u64::from_str_radix(s, 16).ok().filter(|v| *v != 0).map(Self)
    }
}

impl Default for SpanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self)
    }
}

macro_rules! hex_serde {
    ($ty:ident, $what:literal) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $ty::parse(&s).ok_or_else(|| serde::de::Error::custom(concat!("invalid ", $what)))
            }
        }
    };
}

hex_serde!(TraceId, "trace id");
hex_serde!(SpanId, "span id");

/// Identity of one unit of work within a logical trace.
///
/// Immutable once created; derive children with [`TraceContext::child`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl TraceContext {
    /// Start a brand new trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::new(),
            span_id: SpanId::new(),
            parent_span_id: None,
            tenant: None,
            route: None,
            user_id: None,
        }
    }

    /// Derive a child: same trace, fresh span, parent set to this span.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::new(),
            parent_span_id: Some(self.span_id),
            tenant: self.tenant.clone(),
            route: self.route.clone(),
            user_id: self.user_id.clone(),
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Render as a W3C `traceparent` header value (always sampled).
    pub fn to_traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id)
    }

    /// Continue a trace from an incoming `traceparent` header.
    ///
    /// The returned context is a child of the remote span.
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let version = parts.next()?;
        let trace_id = TraceId::parse(parts.next()?)?;
        let parent = SpanId::parse(parts.next()?)?;
        let flags = parts.next()?;
        if version.len() != 2 || version == "ff" || flags.len() != 2 || parts.next().is_some() {
            return None;
        }
        Some(Self {
            trace_id,
            span_id: SpanId::new(),
            parent_span_id: Some(parent),
            tenant: None,
            route: None,
            user_id: None,
        })
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new_root()
    }
}

/// Partial context used to seed a logger; missing ids are generated.
#[derive(Debug, Clone, Default)]
pub struct ContextSeed {
    pub trace_id: Option<TraceId>,
    pub span_id: Option<SpanId>,
    pub parent_span_id: Option<SpanId>,
    pub tenant: Option<String>,
    pub route: Option<String>,
    pub user_id: Option<String>,
}

impl From<ContextSeed> for TraceContext {
    fn from(seed: ContextSeed) -> Self {
        Self {
            trace_id: seed.trace_id.unwrap_or_default(),
            span_id: seed.span_id.unwrap_or_default(),
            parent_span_id: seed.parent_span_id,
            tenant: seed.tenant,
            route: seed.route,
            user_id: seed.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shapes() {
        let trace = TraceId::new().to_string();
        let span = SpanId::new().to_string();
        assert_eq!(trace.len(), 32);
        assert_eq!(span.len(), 16);
        assert!(trace.bytes().all(|b| b.is_ascii_hexdigit()));
        assert!(span.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_unique() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| SpanId::new()).collect();
        assert_eq!(ids.len(), 1000);
        assert_ne!(TraceId::new(), TraceId::new());
    }

    #[test]
    fn test_parse_roundtrip_and_rejects() {
        let id = TraceId::new();
        assert_eq!(TraceId::parse(&id.to_string()), Some(id));
        assert!(TraceId::parse("not-hex").is_none());
        assert!(TraceId::parse(&"0".repeat(32)).is_none());
        assert!(SpanId::parse("abc").is_none());
    }

    #[test]
    fn test_child_links_to_parent() {
        let root = TraceContext::new_root().with_route("/invoices");
        let child = root.child();
        assert_eq!(child.trace_id, root.trace_id);
        assert_eq!(child.parent_span_id, Some(root.span_id));
        assert_ne!(child.span_id, root.span_id);
        assert_eq!(child.route.as_deref(), Some("/invoices"));
    }

    #[test]
    fn test_traceparent() {
        let ctx = TraceContext::new_root();
        let header = ctx.to_traceparent();
        assert_eq!(header.len(), 55);

        let continued = TraceContext::from_traceparent(&header).unwrap();
        assert_eq!(continued.trace_id, ctx.trace_id);
        assert_eq!(continued.parent_span_id, Some(ctx.span_id));

        assert!(TraceContext::from_traceparent("00-abc-def-01").is_none());
        assert!(TraceContext::from_traceparent(&format!("ff-{}-{}-01", ctx.trace_id, ctx.span_id)).is_none());
    }

    #[test]
    fn test_seed_fills_missing_ids() {
        let trace_id = TraceId::new();
        let ctx: TraceContext = ContextSeed {
            trace_id: Some(trace_id),
            tenant: Some("acme".to_string()),
            ..Default::default()
        }
        .into();
        assert_eq!(ctx.trace_id, trace_id);
        assert_eq!(ctx.tenant.as_deref(), Some("acme"));
    }

    #[test]
    fn test_context_serde() {
        let ctx = TraceContext::new_root().with_user("u-1");
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["trace_id"].as_str().unwrap().len(), 32);
        assert!(json.get("parent_span_id").is_none());
        let parsed: TraceContext = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, ctx);
    }
}
