// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Format resolution across a linear chain of plugins.
//!
//! The head of the chain keeps its configured output. Every later stage must
//! accept the format produced by its predecessor; among the combinations it
//! offers, the policy decides which survive, and the stage's current choice is
//! kept when it is among them. Nothing is committed here: the caller applies
//! the returned selections only when the whole chain resolved.

use serde::{Deserialize, Serialize};

use crate::core::error::{IspError, Result};
use crate::core::pixel_format::PixelFormat;
use crate::core::ports::{ActivePortSelection, PortRegistry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Only keep combinations whose output the next stage accepts.
    #[default]
    LookAhead,
    /// Take the first combination matching the upstream format.
    FirstMatch,
}

/// One plugin as seen by the resolver.
#[derive(Debug, Clone, Copy)]
pub struct ChainStage<'a> {
    pub name: &'a str,
    pub ports: &'a PortRegistry,
}

impl<'a> ChainStage<'a> {
    pub fn new(name: &'a str, ports: &'a PortRegistry) -> Self {
        Self { name, ports }
    }
}

/// Compute an active selection for every stage, or fail for the whole chain.
pub fn resolve_port_chain(
    stages: &[ChainStage<'_>],
    policy: ResolutionPolicy,
) -> Result<Vec<ActivePortSelection>> {
    for stage in stages {
        stage.ports.ensure_valid().map_err(|e| {
            IspError::PortRegistration(format!("plugin '{}': {}", stage.name, e))
        })?;
    }

    let Some(head) = stages.first() else {
        return Ok(Vec::new());
    };
    head.ports.validate_active().map_err(|e| {
        IspError::IncompatiblePortChain(format!("head plugin '{}': {}", head.name, e))
    })?;

    let mut selections = Vec::with_capacity(stages.len());
    selections.push(head.ports.active());

    for index in 1..stages.len() {
        let previous = &stages[index - 1];
        let stage = &stages[index];

        let upstream = previous
            .ports
            .output_spec(selections[index - 1].active_output_index)
            .map(|spec| spec.format)
            .map_err(|_| {
                IspError::IncompatiblePortChain(format!(
                    "'{}' produces no output but is followed by '{}'",
                    previous.name, stage.name
                ))
            })?;

        if stage.ports.is_source() {
            return Err(IspError::IncompatiblePortChain(format!(
                "'{}' takes no input but follows '{}'",
                stage.name, previous.name
            )));
        }

        let candidates = stage.ports.candidates_for_input(upstream);
        if candidates.is_empty() {
            return Err(IspError::IncompatiblePortChain(format!(
                "'{}' does not accept {} produced by '{}'",
                stage.name, upstream, previous.name
            )));
        }

        let next = stages.get(index + 1);
        let admissible: Vec<ActivePortSelection> = match (policy, next) {
            (ResolutionPolicy::LookAhead, Some(next)) if !stage.ports.is_sink() => candidates
                .into_iter()
                .filter(|candidate| {
                    output_format(stage.ports, candidate)
                        .is_some_and(|format| next.ports.accepts_input(format))
                })
                .collect(),
            _ => candidates,
        };

        let Some(chosen) = prefer_current(stage.ports, &admissible) else {
            let next_name = next.map(|n| n.name).unwrap_or("<end>");
            return Err(IspError::IncompatiblePortChain(format!(
                "'{}' cannot turn {} into any format '{}' accepts",
                stage.name, upstream, next_name
            )));
        };

        tracing::debug!(
            "[resolve] '{}': {} -> input {} / output {}",
            stage.name,
            upstream,
            chosen.active_input_index,
            chosen.active_output_index
        );
        selections.push(chosen);
    }

    Ok(selections)
}

fn output_format(ports: &PortRegistry, selection: &ActivePortSelection) -> Option<PixelFormat> {
    ports
        .output_spec(selection.active_output_index)
        .ok()
        .map(|spec| spec.format)
}

/// Keep the current selection, then the current output format, then the
/// first candidate in registration order.
fn prefer_current(
    ports: &PortRegistry,
    admissible: &[ActivePortSelection],
) -> Option<ActivePortSelection> {
    let current = ports.active();
    if admissible.contains(&current) {
        return Some(current);
    }
    if let Some(current_output) = ports.active_output_format() {
        if let Some(same_output) = admissible
            .iter()
            .find(|candidate| output_format(ports, candidate) == Some(current_output))
        {
            return Some(*same_output);
        }
    }
    admissible.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(formats: &[PixelFormat], active: usize) -> PortRegistry {
        let mut ports = PortRegistry::new();
        for &format in formats {
            ports.add_output_port_candidate_spec(format);
        }
        ports.set_active_output(active).unwrap();
        ports
    }

    fn identity(formats: &[PixelFormat]) -> PortRegistry {
        let mut ports = PortRegistry::new();
        for &format in formats {
            let input = ports.add_input_port_candidate_spec(format);
            let output = ports.add_output_port_candidate_spec(format);
            ports.add_port_relation(input, output).unwrap();
        }
        ports
    }

    fn sink(formats: &[PixelFormat]) -> PortRegistry {
        let mut ports = PortRegistry::new();
        for &format in formats {
            ports.add_input_port_candidate_spec(format);
        }
        ports
    }

    /// Bayer in, BGR888 or BGR48 out from either depth.
    fn demosaic_any_depth() -> PortRegistry {
        let mut ports = PortRegistry::new();
        let rg8 = ports.add_input_port_candidate_spec(PixelFormat::BayerRg8);
        let bgr888 = ports.add_output_port_candidate_spec(PixelFormat::Bgr888);
        let bgr48 = ports.add_output_port_candidate_spec(PixelFormat::Bgr48);
        ports.add_port_relation(rg8, bgr888).unwrap();
        ports.add_port_relation(rg8, bgr48).unwrap();
        ports
    }

    #[test]
    fn test_empty_chain() {
        assert!(resolve_port_chain(&[], ResolutionPolicy::LookAhead)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_identity_chain_follows_source() {
        let src = source(&[PixelFormat::Gray8, PixelFormat::Gray16], 1);
        let gain = identity(&[PixelFormat::Gray8, PixelFormat::Gray16]);
        let display = sink(&[PixelFormat::Gray8, PixelFormat::Gray16]);
        let stages = [
            ChainStage::new("source", &src),
            ChainStage::new("gain", &gain),
            ChainStage::new("display", &display),
        ];
        let selections = resolve_port_chain(&stages, ResolutionPolicy::LookAhead).unwrap();
        assert_eq!(
            selections,
            vec![
                ActivePortSelection::new(0, 1),
                ActivePortSelection::new(1, 1),
                ActivePortSelection::new(1, 0),
            ]
        );
    }

    #[test]
    fn test_look_ahead_picks_output_next_stage_accepts() {
        let src = source(&[PixelFormat::BayerRg8], 0);
        let demosaic = demosaic_any_depth();
        let display = sink(&[PixelFormat::Bgr48]);
        let stages = [
            ChainStage::new("source", &src),
            ChainStage::new("demosaic", &demosaic),
            ChainStage::new("display", &display),
        ];

        let selections = resolve_port_chain(&stages, ResolutionPolicy::LookAhead).unwrap();
        assert_eq!(selections[1], ActivePortSelection::new(0, 1));

        // Without look-ahead the first relation wins and the sink rejects it.
        let result = resolve_port_chain(&stages, ResolutionPolicy::FirstMatch);
        assert!(matches!(result, Err(IspError::IncompatiblePortChain(_))));
    }

    #[test]
    fn test_current_output_choice_is_kept() {
        let src = source(&[PixelFormat::BayerRg8], 0);
        let mut demosaic = demosaic_any_depth();
        demosaic.change_output_port_spec(PixelFormat::Bgr48).unwrap();
        let display = sink(&[PixelFormat::Bgr888, PixelFormat::Bgr48]);
        let stages = [
            ChainStage::new("source", &src),
            ChainStage::new("demosaic", &demosaic),
            ChainStage::new("display", &display),
        ];
        let selections = resolve_port_chain(&stages, ResolutionPolicy::LookAhead).unwrap();
        assert_eq!(selections[1], ActivePortSelection::new(0, 1));
        assert_eq!(selections[2], ActivePortSelection::new(1, 0));
    }

    #[test]
    fn test_unaccepted_upstream_format_fails() {
        let src = source(&[PixelFormat::Gray16], 0);
        let demosaic = demosaic_any_depth();
        let stages = [
            ChainStage::new("source", &src),
            ChainStage::new("demosaic", &demosaic),
        ];
        let err = resolve_port_chain(&stages, ResolutionPolicy::LookAhead).unwrap_err();
        assert!(err.to_string().contains("does not accept GRAY16"));
    }

    #[test]
    fn test_look_ahead_with_no_admissible_output_fails() {
        let src = source(&[PixelFormat::BayerRg8], 0);
        let demosaic = demosaic_any_depth();
        let display = sink(&[PixelFormat::Gray8]);
        let stages = [
            ChainStage::new("source", &src),
            ChainStage::new("demosaic", &demosaic),
            ChainStage::new("display", &display),
        ];
        let err = resolve_port_chain(&stages, ResolutionPolicy::LookAhead).unwrap_err();
        assert!(matches!(err, IspError::IncompatiblePortChain(_)));
        assert!(err.to_string().contains("display"));
    }

    #[test]
    fn test_invalid_registration_blocks_resolution() {
        let src = source(&[PixelFormat::Gray8], 0);
        let mut broken = identity(&[PixelFormat::Gray8]);
        let _ = broken.add_port_relation(0, 9);
        let stages = [
            ChainStage::new("source", &src),
            ChainStage::new("broken", &broken),
        ];
        let err = resolve_port_chain(&stages, ResolutionPolicy::LookAhead).unwrap_err();
        assert!(matches!(err, IspError::PortRegistration(_)));
    }

    #[test]
    fn test_source_in_middle_fails() {
        let a = source(&[PixelFormat::Gray8], 0);
        let b = source(&[PixelFormat::Gray8], 0);
        let stages = [ChainStage::new("a", &a), ChainStage::new("b", &b)];
        assert!(matches!(
            resolve_port_chain(&stages, ResolutionPolicy::FirstMatch),
            Err(IspError::IncompatiblePortChain(_))
        ));
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: ResolutionPolicy = serde_json::from_str("\"first_match\"").unwrap();
        assert_eq!(policy, ResolutionPolicy::FirstMatch);
        assert_eq!(ResolutionPolicy::default(), ResolutionPolicy::LookAhead);
    }
}
