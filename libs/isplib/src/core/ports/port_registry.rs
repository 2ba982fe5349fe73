// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Per-plugin port candidates, relations and active selection.
//!
//! A plugin declares its candidates and relations while it is constructed.
//! After that only the active selection moves, either through a user
//! setting ([`PortRegistry::change_output_port_spec`]) or through pipeline
//! resolution.

use super::port_spec::{ActivePortSelection, PortDirection, PortId, PortRelation, PortSpec};
use crate::core::error::{IspError, Result};
use crate::core::pixel_format::PixelFormat;

#[derive(Debug, Clone, Default)]
pub struct PortRegistry {
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
    relations: Vec<PortRelation>,
    active: ActivePortSelection,
    registration_errors: Vec<String>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an input candidate and return its id (insertion order, from 0).
    pub fn add_input_port_candidate_spec(&mut self, format: PixelFormat) -> PortId {
        let port_id = self.inputs.len();
        self.inputs.push(PortSpec {
            port_id,
            direction: PortDirection::Input,
            format,
        });
        port_id
    }

    /// Append an output candidate and return its id (insertion order, from 0).
    pub fn add_output_port_candidate_spec(&mut self, format: PixelFormat) -> PortId {
        let port_id = self.outputs.len();
        self.outputs.push(PortSpec {
            port_id,
            direction: PortDirection::Output,
            format,
        });
        port_id
    }

    /// Declare that `input_port_id` may produce `output_port_id`.
    ///
    /// Both ids must already be registered. On failure the relation set is
    /// left untouched and the registry is marked invalid, which makes the
    /// owning plugin refuse initialisation.
    pub fn add_port_relation(&mut self, input_port_id: PortId, output_port_id: PortId) -> Result<()> {
        if input_port_id >= self.inputs.len() || output_port_id >= self.outputs.len() {
            let message = format!(
                "relation ({}, {}) references an unregistered port ({} inputs, {} outputs)",
                input_port_id,
                output_port_id,
                self.inputs.len(),
                self.outputs.len()
            );
            self.registration_errors.push(message.clone());
            return Err(IspError::PortRegistration(message));
        }

        let relation = PortRelation::new(input_port_id, output_port_id);
        if !self.relations.contains(&relation) {
            self.relations.push(relation);
        }
        Ok(())
    }

    /// False once any relation failed to register.
    pub fn is_valid(&self) -> bool {
        self.registration_errors.is_empty()
    }

    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(IspError::PortRegistration(self.registration_errors.join("; ")))
        }
    }

    pub fn input_specs(&self) -> &[PortSpec] {
        &self.inputs
    }

    pub fn output_specs(&self) -> &[PortSpec] {
        &self.outputs
    }

    pub fn relations(&self) -> &[PortRelation] {
        &self.relations
    }

    pub fn input_spec(&self, port_id: PortId) -> Result<&PortSpec> {
        self.inputs.get(port_id).ok_or(IspError::InvalidPortId {
            direction: PortDirection::Input,
            port_id,
        })
    }

    pub fn output_spec(&self, port_id: PortId) -> Result<&PortSpec> {
        self.outputs.get(port_id).ok_or(IspError::InvalidPortId {
            direction: PortDirection::Output,
            port_id,
        })
    }

    /// No input candidates: the plugin produces frames on its own.
    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    /// No output candidates: the plugin only consumes frames.
    pub fn is_sink(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn active(&self) -> ActivePortSelection {
        self.active
    }

    /// Format of the active input, `None` for sources.
    pub fn active_input_format(&self) -> Option<PixelFormat> {
        self.inputs
            .get(self.active.active_input_index)
            .map(|spec| spec.format)
    }

    /// Format of the active output, `None` for sinks.
    pub fn active_output_format(&self) -> Option<PixelFormat> {
        self.outputs
            .get(self.active.active_output_index)
            .map(|spec| spec.format)
    }

    pub fn set_active_input(&mut self, port_id: PortId) -> Result<()> {
        self.input_spec(port_id)?;
        self.active.active_input_index = port_id;
        Ok(())
    }

    pub fn set_active_output(&mut self, port_id: PortId) -> Result<()> {
        self.output_spec(port_id)?;
        self.active.active_output_index = port_id;
        Ok(())
    }

    /// Replace the whole selection. Ids are checked for directions that have
    /// candidates; the pair itself is checked at process time.
    pub fn set_active_selection(&mut self, selection: ActivePortSelection) -> Result<()> {
        if !self.is_source() {
            self.input_spec(selection.active_input_index)?;
        }
        if !self.is_sink() {
            self.output_spec(selection.active_output_index)?;
        }
        self.active = selection;
        Ok(())
    }

    pub fn has_relation(&self, input_port_id: PortId, output_port_id: PortId) -> bool {
        self.relations
            .contains(&PortRelation::new(input_port_id, output_port_id))
    }

    /// Check that the active selection may process a frame.
    pub fn validate_active(&self) -> Result<()> {
        let ActivePortSelection {
            active_input_index,
            active_output_index,
        } = self.active;

        match (self.is_source(), self.is_sink()) {
            (true, true) => Err(IspError::PortRegistration(
                "plugin declares no ports".to_string(),
            )),
            (true, false) => self.output_spec(active_output_index).map(|_| ()),
            (false, true) => self.input_spec(active_input_index).map(|_| ()),
            (false, false) => {
                if self.has_relation(active_input_index, active_output_index) {
                    Ok(())
                } else {
                    Err(IspError::UnsupportedConversion(format!(
                        "no relation from input {} ({}) to output {} ({})",
                        active_input_index,
                        self.format_name(self.active_input_format()),
                        active_output_index,
                        self.format_name(self.active_output_format()),
                    )))
                }
            }
        }
    }

    /// Switch the active output to `desired`, if a relation allows it from
    /// the current input. State is untouched on failure.
    pub fn change_output_port_spec(&mut self, desired: PixelFormat) -> Result<PortId> {
        let found = if self.is_source() {
            self.outputs
                .iter()
                .find(|spec| spec.format == desired)
                .map(|spec| spec.port_id)
        } else {
            let input = self.active.active_input_index;
            self.relations
                .iter()
                .filter(|relation| relation.input_port_id == input)
                .map(|relation| relation.output_port_id)
                .find(|&output| self.outputs[output].format == desired)
        };

        match found {
            Some(port_id) => {
                self.active.active_output_index = port_id;
                Ok(port_id)
            }
            None => Err(IspError::UnsupportedConversion(format!(
                "no conversion from {} to {}",
                self.format_name(self.active_input_format()),
                desired
            ))),
        }
    }

    pub fn accepts_input(&self, format: PixelFormat) -> bool {
        self.inputs.iter().any(|spec| spec.format == format)
    }

    /// Selections that consume `format`, in relation registration order.
    ///
    /// Sinks yield one selection per matching input candidate.
    pub fn candidates_for_input(&self, format: PixelFormat) -> Vec<ActivePortSelection> {
        if self.is_sink() {
            return self
                .inputs
                .iter()
                .filter(|spec| spec.format == format)
                .map(|spec| ActivePortSelection::new(spec.port_id, 0))
                .collect();
        }
        self.relations
            .iter()
            .filter(|relation| self.inputs[relation.input_port_id].format == format)
            .map(|relation| ActivePortSelection::new(relation.input_port_id, relation.output_port_id))
            .collect()
    }

    fn format_name(&self, format: Option<PixelFormat>) -> &'static str {
        format.map(|f| f.name()).unwrap_or("none")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_pair_registry() -> PortRegistry {
        let mut registry = PortRegistry::new();
        assert_eq!(registry.add_input_port_candidate_spec(PixelFormat::Gray8), 0);
        assert_eq!(registry.add_input_port_candidate_spec(PixelFormat::Gray16), 1);
        assert_eq!(registry.add_output_port_candidate_spec(PixelFormat::Gray8), 0);
        assert_eq!(registry.add_output_port_candidate_spec(PixelFormat::Gray16), 1);
        registry.add_port_relation(0, 0).unwrap();
        registry.add_port_relation(1, 1).unwrap();
        registry
    }

    #[test]
    fn test_relation_requires_registered_ids() {
        for inputs in 0..3usize {
            for outputs in 0..3usize {
                for i in 0..4 {
                    for o in 0..4 {
                        let mut registry = PortRegistry::new();
                        for _ in 0..inputs {
                            registry.add_input_port_candidate_spec(PixelFormat::Gray8);
                        }
                        for _ in 0..outputs {
                            registry.add_output_port_candidate_spec(PixelFormat::Gray8);
                        }
                        let result = registry.add_port_relation(i, o);
                        if i < inputs && o < outputs {
                            assert!(result.is_ok());
                            assert_eq!(registry.relations(), &[PortRelation::new(i, o)]);
                            assert!(registry.is_valid());
                        } else {
                            assert!(matches!(result, Err(IspError::PortRegistration(_))));
                            assert!(registry.relations().is_empty());
                            assert!(!registry.is_valid());
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_failed_relation_keeps_existing_set() {
        let mut registry = gray_pair_registry();
        assert!(registry.add_port_relation(0, 7).is_err());
        assert_eq!(
            registry.relations(),
            &[PortRelation::new(0, 0), PortRelation::new(1, 1)]
        );
        assert!(matches!(
            registry.ensure_valid(),
            Err(IspError::PortRegistration(_))
        ));
    }

    #[test]
    fn test_duplicate_relation_is_stored_once() {
        let mut registry = gray_pair_registry();
        registry.add_port_relation(0, 0).unwrap();
        assert_eq!(registry.relations().len(), 2);
    }

    #[test]
    fn test_change_output_follows_active_input() {
        let mut registry = gray_pair_registry();

        registry.set_active_input(1).unwrap();
        assert_eq!(registry.change_output_port_spec(PixelFormat::Gray16).unwrap(), 1);
        assert_eq!(registry.active().active_output_index, 1);

        registry.set_active_selection(ActivePortSelection::new(0, 0)).unwrap();
        let result = registry.change_output_port_spec(PixelFormat::Gray16);
        assert!(matches!(result, Err(IspError::UnsupportedConversion(_))));
        assert_eq!(registry.active(), ActivePortSelection::new(0, 0));
    }

    #[test]
    fn test_change_output_is_all_or_nothing() {
        let mut registry = gray_pair_registry();
        registry.set_active_selection(ActivePortSelection::new(1, 1)).unwrap();
        for format in PixelFormat::ALL {
            let before = registry.active();
            match registry.change_output_port_spec(format) {
                Ok(port_id) => {
                    assert_eq!(registry.output_spec(port_id).unwrap().format, format);
                    assert_eq!(registry.active().active_output_index, port_id);
                    assert_eq!(registry.active().active_input_index, 1);
                }
                Err(_) => assert_eq!(registry.active(), before),
            }
        }
    }

    #[test]
    fn test_unknown_ids_are_rejected() {
        let mut registry = gray_pair_registry();
        assert!(matches!(
            registry.set_active_input(2),
            Err(IspError::InvalidPortId {
                direction: PortDirection::Input,
                port_id: 2
            })
        ));
        assert!(matches!(
            registry.output_spec(5),
            Err(IspError::InvalidPortId {
                direction: PortDirection::Output,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_active_requires_relation() {
        let mut registry = gray_pair_registry();
        registry.set_active_selection(ActivePortSelection::new(0, 1)).unwrap();
        assert!(matches!(
            registry.validate_active(),
            Err(IspError::UnsupportedConversion(_))
        ));
        registry.set_active_output(0).unwrap();
        assert!(registry.validate_active().is_ok());
    }

    #[test]
    fn test_source_and_sink_selection() {
        let mut source = PortRegistry::new();
        source.add_output_port_candidate_spec(PixelFormat::Gray8);
        source.add_output_port_candidate_spec(PixelFormat::BayerRg16);
        assert!(source.is_source());
        assert_eq!(source.active_input_format(), None);
        assert_eq!(source.change_output_port_spec(PixelFormat::BayerRg16).unwrap(), 1);
        assert!(source.validate_active().is_ok());

        let mut sink = PortRegistry::new();
        sink.add_input_port_candidate_spec(PixelFormat::Gray8);
        sink.add_input_port_candidate_spec(PixelFormat::Bgr888);
        assert!(sink.is_sink());
        assert_eq!(
            sink.candidates_for_input(PixelFormat::Bgr888),
            vec![ActivePortSelection::new(1, 0)]
        );
        assert!(sink.validate_active().is_ok());
    }

    #[test]
    fn test_candidates_for_input_follow_relation_order() {
        let mut registry = PortRegistry::new();
        let bgr = registry.add_input_port_candidate_spec(PixelFormat::Bgr888);
        let gray_out = registry.add_output_port_candidate_spec(PixelFormat::Gray8);
        let bgr_out = registry.add_output_port_candidate_spec(PixelFormat::Bgr888);
        registry.add_port_relation(bgr, bgr_out).unwrap();
        registry.add_port_relation(bgr, gray_out).unwrap();

        assert_eq!(
            registry.candidates_for_input(PixelFormat::Bgr888),
            vec![
                ActivePortSelection::new(bgr, bgr_out),
                ActivePortSelection::new(bgr, gray_out)
            ]
        );
        assert!(registry.candidates_for_input(PixelFormat::Gray8).is_empty());
    }
}
