// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Deterministic grouping keys for tracked errors.

use sha2::{Digest, Sha256};

/// Frames of the stack that participate in the fingerprint.
pub const FINGERPRINT_FRAMES: usize = 3;

/// Fingerprint an error from its message and the top of its stack.
///
/// Errors that share a message and their first three non-empty stack lines
/// group together even when deeper frames differ. Leading/trailing
/// whitespace on each line is ignored.
pub fn fingerprint(message: &str, stack: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(message.trim().as_bytes());

    if let Some(stack) = stack {
        for frame in stack
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(FINGERPRINT_FRAMES)
        {
            hasher.update(b"\n");
            hasher.update(frame.as_bytes());
        }
    }

    let hash = format!("{:x}", hasher.finalize());
    hash[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = "at load_invoice (invoices.rs:10)\n\
                         at InvoiceList::refresh (list.rs:44)\n\
                         at App::tick (app.rs:9)\n\
                         at main (main.rs:3)";

    #[test]
    fn test_identical_inputs_match() {
        let a = fingerprint("relation missing", Some(STACK));
        let b = fingerprint("relation missing", Some(STACK));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_different_message_differs() {
        assert_ne!(
            fingerprint("relation missing", Some(STACK)),
            fingerprint("permission denied", Some(STACK))
        );
        assert_ne!(fingerprint("a", None), fingerprint("b", None));
    }

    #[test]
    fn test_only_top_frames_count() {
        let deeper = STACK.replace("at main (main.rs:3)", "at worker (pool.rs:77)");
        assert_eq!(
            fingerprint("relation missing", Some(STACK)),
            fingerprint("relation missing", Some(&deeper))
        );

        let top = STACK.replace("invoices.rs:10", "invoices.rs:11");
        assert_ne!(
            fingerprint("relation missing", Some(STACK)),
            fingerprint("relation missing", Some(&top))
        );
    }

    #[test]
    fn test_blank_lines_and_indentation_ignored() {
        let noisy = format!("\n\n   {}\n", STACK.replace('\n', "\n\n    "));
        assert_eq!(fingerprint("x", Some(STACK)), fingerprint("x", Some(&noisy)));
        assert_eq!(fingerprint("x", Some("")), fingerprint("x", None));
    }
}
