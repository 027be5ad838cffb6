//! Key-layout helpers for the session & pending-queue store (§4.4).

use crate::models::PendingKind;

/// Builds namespaced keys under the configured prefix. Empty prefix means no namespacing.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(namespace: &str) -> Self {
        let prefix = if namespace.is_empty() {
            String::new()
        } else {
            format!("{}:", namespace)
        };
        Self { prefix }
    }

    pub fn session(&self, refresh_token: &str) -> String {
        format!("{}session:{}", self.prefix, refresh_token)
    }

    pub fn client_session(&self, client_instance_id: &str) -> String {
        format!("{}client_session:{}", self.prefix, client_instance_id)
    }

    pub fn copysetup_sessions(&self, copy_setup_id: i64) -> String {
        format!("{}copysetup_sessions:{}", self.prefix, copy_setup_id)
    }

    pub fn pending_item(&self, client_instance_id: &str, kind: PendingKind, item_id: i64) -> String {
        format!(
            "{}pending:{}:{}:{}",
            self.prefix,
            client_instance_id,
            kind.as_key_segment(),
            item_id
        )
    }

    pub fn pending_scan_pattern(&self, client_instance_id: &str, kind: PendingKind) -> String {
        format!(
            "{}pending:{}:{}:*",
            self.prefix,
            client_instance_id,
            kind.as_key_segment()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_unnamespaced_keys() {
        let kb = KeyBuilder::new("");
        assert_eq!(kb.session("abc"), "session:abc");
        assert_eq!(kb.copysetup_sessions(7), "copysetup_sessions:7");
    }

    #[test]
    fn builds_namespaced_keys() {
        let kb = KeyBuilder::new("prod");
        assert_eq!(kb.session("abc"), "prod:session:abc");
        assert_eq!(
            kb.pending_item("cid-1", PendingKind::Trade, 42),
            "prod:pending:cid-1:trades:42"
        );
    }
}
