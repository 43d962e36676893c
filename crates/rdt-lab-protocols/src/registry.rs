use anyhow::Result;

use crate::ProtocolKind;

/// Map a user-visible builtin name to the protocol it selects.
pub fn protocol_by_name(name: &str) -> Result<ProtocolKind> {
    match name.to_ascii_lowercase().as_str() {
        "stop-and-wait" | "stop_and_wait" | "saw" | "abp" => Ok(ProtocolKind::StopAndWait),
        "gbn" | "go-back-n" | "go_back_n" => Ok(ProtocolKind::GoBackN),
        other => anyhow::bail!("Unknown protocol '{other}'. Try 'stop-and-wait' or 'gbn'."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_aliases_resolve() {
        assert_eq!(protocol_by_name("GBN").unwrap(), ProtocolKind::GoBackN);
        assert_eq!(protocol_by_name("go-back-n").unwrap(), ProtocolKind::GoBackN);
        assert_eq!(
            protocol_by_name("stop-and-wait").unwrap(),
            ProtocolKind::StopAndWait
        );
        assert!(protocol_by_name("selective-repeat").is_err());
    }
}
