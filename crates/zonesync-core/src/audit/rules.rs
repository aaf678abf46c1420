//! Reusable audit checks
//!
//! Each check looks at one record and returns why it is rejected. Providers
//! pick the checks matching their API's limits when they register.

use super::CheckResult;
use crate::record::{RecordConfig, RecordData};

/// Reject MX records with a null exchange (`0 .`)
pub fn mx_null(rc: &RecordConfig) -> CheckResult {
    match rc.data() {
        RecordData::MX { exchange, .. } if exchange.trim() == "." => {
            Err("null MX is not supported".to_string())
        }
        _ => Ok(()),
    }
}

/// Reject SRV records with a null target
pub fn srv_null_target(rc: &RecordConfig) -> CheckResult {
    match rc.data() {
        RecordData::SRV { target, .. } if target.trim() == "." => {
            Err("SRV with a null target is not supported".to_string())
        }
        _ => Ok(()),
    }
}

/// Reject TXT records whose text is empty
pub fn txt_is_empty(rc: &RecordConfig) -> CheckResult {
    match rc.data().txt_joined() {
        Some(text) if text.is_empty() => Err("empty TXT is not supported".to_string()),
        _ => Ok(()),
    }
}

/// Reject TXT records containing a double quote
pub fn txt_has_double_quotes(rc: &RecordConfig) -> CheckResult {
    match rc.data().txt_joined() {
        Some(text) if text.contains('"') => {
            Err("TXT containing double quotes is not supported".to_string())
        }
        _ => Ok(()),
    }
}

/// Reject TXT records ending with whitespace
pub fn txt_has_trailing_space(rc: &RecordConfig) -> CheckResult {
    match rc.data().txt_joined() {
        Some(text) if text.ends_with(char::is_whitespace) => {
            Err("TXT with trailing whitespace is not supported".to_string())
        }
        _ => Ok(()),
    }
}

/// Reject CAA records with a non-zero flag
pub fn caa_flag_nonzero(rc: &RecordConfig) -> CheckResult {
    match rc.data() {
        RecordData::CAA { flag, .. } if *flag != 0 => {
            Err(format!("CAA flag {} is not supported, only 0", flag))
        }
        _ => Ok(()),
    }
}

/// Reject CNAME records at the zone apex
pub fn cname_at_apex(rc: &RecordConfig) -> CheckResult {
    if rc.is_apex() && matches!(rc.data(), RecordData::CNAME { .. }) {
        Err("CNAME is not allowed at the apex".to_string())
    } else {
        Ok(())
    }
}

/// Reject NS records at the zone apex (provider manages its own)
pub fn ns_at_apex(rc: &RecordConfig) -> CheckResult {
    if rc.is_apex() && matches!(rc.data(), RecordData::NS { .. }) {
        Err("apex NS records are managed by the provider".to_string())
    } else {
        Ok(())
    }
}

/// Build a check rejecting a metadata flag on every type but `types`.
///
/// A flag set to `""` or `"off"` counts as absent.
pub fn metadata_only_on(
    key: &'static str,
    types: &'static [&'static str],
) -> impl Fn(&RecordConfig) -> CheckResult + Send + Sync + 'static {
    move |rc: &RecordConfig| {
        let enabled = matches!(rc.metadata_value(key), Some(v) if !v.is_empty() && v != "off");
        let allowed = types.iter().any(|t| t.eq_ignore_ascii_case(rc.type_name()));
        if enabled && !allowed {
            Err(format!(
                "metadata {} is only supported on {} records",
                key,
                types.join(", ")
            ))
        } else {
            Ok(())
        }
    }
}
