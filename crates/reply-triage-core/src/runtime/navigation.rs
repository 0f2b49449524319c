// crates/reply-triage-core/src/runtime/navigation.rs
// ============================================================================
// Module: Step Addresses
// Description: Stable addresses of wizard steps for hosts that route by path.
// Purpose: Map (instance, step) pairs to path strings and back.
// Dependencies: percent-encoding, crate::core
// ============================================================================

//! ## Overview
//! A step address is `{base}/{instance_id}/{step_key}`. Hosts redirect to the
//! address of the resolved step after every transition; parsing an address
//! never implies the step is current, the driver still checks that.
//!
//! Thread identifiers are free-form, so the instance segment is
//! percent-encoded; `/`, `%`, `?` and `#` never appear raw in it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use percent_encoding::AsciiSet;
use percent_encoding::CONTROLS;
use percent_encoding::percent_decode_str;
use percent_encoding::utf8_percent_encode;

use crate::core::InstanceId;
use crate::core::StepKey;

// ============================================================================
// SECTION: Addresses
// ============================================================================

/// Default base path for obligee-action step addresses.
pub const DEFAULT_BASE_PATH: &str = "/obligee-action";

/// Characters escaped in the instance segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Formats the address of a step.
#[must_use]
pub fn step_address(base: &str, instance_id: &InstanceId, step: StepKey) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        utf8_percent_encode(instance_id.as_str(), SEGMENT),
        step.as_str()
    )
}

/// Parses a step address under `base`.
///
/// Returns `None` when the path is outside `base`, malformed, or names an
/// unknown step.
#[must_use]
pub fn parse_step_address(base: &str, path: &str) -> Option<(InstanceId, StepKey)> {
    let rest = path.strip_prefix(base.trim_end_matches('/'))?.strip_prefix('/')?;
    let (instance, step) = rest.trim_end_matches('/').split_once('/')?;
    if instance.is_empty() || step.contains('/') {
        return None;
    }
    let step = step.parse::<StepKey>().ok()?;
    let instance = percent_decode_str(instance).decode_utf8().ok()?;
    Some((InstanceId::from_raw(instance.into_owned()), step))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ThreadId;
    use crate::core::WizardKind;

    #[test]
    fn addresses_round_trip() {
        let instance_id = InstanceId::derive(WizardKind::ObligeeAction, &ThreadId::new("42"));
        let address = step_address(DEFAULT_BASE_PATH, &instance_id, StepKey::IsOnTopic);
        assert_eq!(address, "/obligee-action/obligee-action-42/is_on_topic");
        assert_eq!(parse_step_address(DEFAULT_BASE_PATH, &address), Some((instance_id, StepKey::IsOnTopic)));
    }

    #[test]
    fn thread_ids_with_reserved_characters_round_trip() {
        for thread in ["2024/17", "a b?c#d", "50%", "č/ř"] {
            let instance_id = InstanceId::derive(WizardKind::ObligeeAction, &ThreadId::new(thread));
            let address = step_address(DEFAULT_BASE_PATH, &instance_id, StepKey::Basics);
            assert_eq!(address.matches('/').count(), 3, "{address}");
            assert_eq!(parse_step_address(DEFAULT_BASE_PATH, &address), Some((instance_id, StepKey::Basics)));
        }
        let instance_id = InstanceId::derive(WizardKind::ObligeeAction, &ThreadId::new("2024/17"));
        assert_eq!(
            step_address(DEFAULT_BASE_PATH, &instance_id, StepKey::Basics),
            "/obligee-action/obligee-action-2024%2F17/basics"
        );
    }

    #[test]
    fn invalid_percent_encoding_is_rejected() {
        assert_eq!(parse_step_address(DEFAULT_BASE_PATH, "/obligee-action/x%FF/basics"), None);
    }

    #[test]
    fn foreign_or_malformed_paths_are_rejected() {
        assert_eq!(parse_step_address(DEFAULT_BASE_PATH, "/other/x/basics"), None);
        assert_eq!(parse_step_address(DEFAULT_BASE_PATH, "/obligee-action/x"), None);
        assert_eq!(parse_step_address(DEFAULT_BASE_PATH, "/obligee-action/x/unknown"), None);
        assert_eq!(parse_step_address(DEFAULT_BASE_PATH, "/obligee-action/x/basics/extra"), None);
    }
}
