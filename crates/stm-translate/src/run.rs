//! The per-bundle translation loop.
//!
//! Metadata (identity, report) is applied first. Every other object is then
//! classified, extracted, mapped and assembled in input order. A failure is
//! contained to the object that raised it and recorded in the
//! [`RunReport`]; only unreadable input and an empty result end the run.

use std::collections::{BTreeMap, HashSet};
use std::slice;

use stm_config::{Stix2MispConfig, TranslateConfig};
use stm_core::bundle::Bundle;
use stm_core::errors::TranslationError;
use stm_core::mapping::ObjectCategory;
use stm_core::observable::ObservableSubObject;
use stm_core::output::{Galaxy, Org, OutputAttribute, OutputEvent};
use stm_core::source::{Report, SourceKind, SourceObject};
use stm_core::timestamp::{epoch_seconds, parse_epoch};
use stm_pattern::{Collapsed, CompositeRules, Joiner};
use tracing::{debug, info, warn};

use crate::builder::{Built, FieldGroups, ObjectBuilder, ObjectSpec};
use crate::dispatcher::{AttributeHint, Decision, Dispatcher, ObjectHint};
use crate::report::RunReport;
use crate::tables::{FieldMapper, MappingTables};
use crate::walker::{FlatRecord, ObservableWalker};

/// Event and report of one finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationOutcome {
    pub event: OutputEvent,
    pub report: RunReport,
}

/// Translation settings and tables, built once and reused across bundles.
#[derive(Debug, Clone)]
pub struct TranslationRun {
    tables: MappingTables,
    settings: TranslateConfig,
    rules: CompositeRules,
}

impl Default for TranslationRun {
    fn default() -> Self {
        Self::new(&Stix2MispConfig::default())
    }
}

impl TranslationRun {
    #[must_use]
    pub fn new(config: &Stix2MispConfig) -> Self {
        Self {
            tables: MappingTables::builtin().with_overrides(&config.mappings),
            settings: config.translate.clone(),
            rules: CompositeRules::new(config.translate.composite_separator.clone()),
        }
    }

    /// Decode `text` as a bundle and translate it.
    ///
    /// # Errors
    ///
    /// [`TranslationError::UnreadableInput`] when the text is not a bundle,
    /// [`TranslationError::NoTranslatableObjects`] when nothing in it could
    /// be translated.
    pub fn translate_str(&self, text: &str) -> Result<TranslationOutcome, TranslationError> {
        let bundle = Bundle::parse(text, &self.settings.origin_label)?;
        self.translate(&bundle)
    }

    /// Translate a decoded bundle.
    ///
    /// # Errors
    ///
    /// [`TranslationError::NoTranslatableObjects`] when the event ends up
    /// with no attribute, object or galaxy.
    pub fn translate(&self, bundle: &Bundle) -> Result<TranslationOutcome, TranslationError> {
        let mut event = OutputEvent::default();
        let mut report = RunReport::default();
        let dispatcher = Dispatcher::new();
        let builder = ObjectBuilder::new(
            FieldMapper::new(&self.tables, &self.settings.custom_field_prefix),
            self.rules.separator(),
        );

        let consumed = self.apply_metadata(bundle, &mut event);

        for object in &bundle.objects {
            let decision = dispatcher.classify(object);
            if decision == Decision::Metadata {
                if consumed.contains(object.id.as_str()) {
                    continue;
                }
                if let SourceKind::Report(_) = object.kind {
                    let err = TranslationError::UnsupportedObject(
                        "report beyond the one used for event metadata".to_string(),
                    );
                    warn!(object_id = %object.id, reason = %err, "skipping object");
                    report.record_skip(&object.id, &err);
                } else {
                    debug!(object_id = %object.id, "ignoring additional identity");
                }
                continue;
            }

            match self.translate_object(object, decision, bundle, &builder) {
                Ok(built) => {
                    debug!(
                        object_id = %object.id,
                        attributes = built.attributes.len(),
                        objects = built.objects.len(),
                        galaxies = built.galaxies.len(),
                        "translated object"
                    );
                    merge(&mut event, &mut report, &object.id, built);
                }
                Err(err) => {
                    warn!(object_id = %object.id, kind = %err.kind(), reason = %err, "skipping object");
                    report.record_skip(&object.id, &err);
                }
            }
        }

        report.count(&event);
        info!(
            attributes = report.attributes,
            objects = report.objects,
            galaxies = report.galaxies,
            skipped = report.skipped(),
            unmapped = report.unmapped.len(),
            "translation finished"
        );
        if event.is_empty() {
            return Err(TranslationError::NoTranslatableObjects);
        }
        Ok(TranslationOutcome { event, report })
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    /// Apply identity and report metadata; returns the ids consumed.
    ///
    /// A MISP bundle uses its origin report. A foreign bundle uses its report
    /// only when there is exactly one.
    fn apply_metadata<'b>(&self, bundle: &'b Bundle, event: &mut OutputEvent) -> HashSet<&'b str> {
        let mut consumed = HashSet::new();

        let identity = bundle.objects.iter().find_map(|o| match &o.kind {
            SourceKind::Identity(identity) => Some((o, identity)),
            _ => None,
        });
        if let Some((object, identity)) = identity {
            if let Some(name) = identity.name.as_deref().filter(|n| !n.trim().is_empty()) {
                event.org = Some(Org {
                    name: name.to_string(),
                });
            }
            consumed.insert(object.id.as_str());
        }

        let reports: Vec<(&SourceObject, &Report)> = bundle
            .objects
            .iter()
            .filter_map(|o| match &o.kind {
                SourceKind::Report(report) => Some((o, report)),
                _ => None,
            })
            .collect();
        let chosen = if bundle.from_misp {
            reports
                .iter()
                .find(|(_, r)| r.labels.iter().any(|l| *l == self.settings.origin_label))
                .copied()
        } else if let [only] = reports.as_slice() {
            Some(*only)
        } else {
            None
        };

        if let Some((object, source)) = chosen {
            event.info.clone_from(&source.name);
            event.publish_timestamp = source.published.as_ref().map(epoch_seconds);
            for label in &source.labels {
                event.add_tag(label.as_str());
            }
            for reference in &source.external_references {
                let comment = reference.source_name.as_deref().map(|name| {
                    name.split_once("url - ")
                        .map_or(name, |(_, rest)| rest)
                        .to_string()
                });
                let link = reference
                    .url
                    .as_deref()
                    .and_then(|url| OutputAttribute::new("link", url));
                event
                    .attributes
                    .extend(link.map(|a| a.with_comment(comment.filter(|c| !c.is_empty()))));
            }
            consumed.insert(object.id.as_str());
        }
        consumed
    }

    // -----------------------------------------------------------------------
    // Per-object translation
    // -----------------------------------------------------------------------

    fn translate_object(
        &self,
        object: &SourceObject,
        decision: Decision,
        bundle: &Bundle,
        builder: &ObjectBuilder<'_>,
    ) -> Result<Built, TranslationError> {
        let mut built = Built::default();
        match decision {
            Decision::Skip(err) => return Err(err),
            Decision::Metadata => {}
            Decision::Attribute(hint) => built.attributes.push(self.hinted_attribute(object, &hint, builder)?),
            Decision::Object(hint) => built = self.hinted_object(object, &hint, builder)?,
            Decision::CustomObject => match &object.kind {
                SourceKind::Custom(custom) => built.objects.push(builder.custom_object(custom)?),
                _ => return Err(unexpected(object)),
            },
            Decision::GalaxyCluster(hint) => match &object.kind {
                SourceKind::Galaxy(galaxy) => built.galaxies.push(builder.galaxy(galaxy, hint.as_ref())?),
                _ => return Err(unexpected(object)),
            },
            Decision::CourseOfAction => match &object.kind {
                SourceKind::CourseOfAction(source) => {
                    built.objects.push(builder.course_of_action(source)?);
                }
                _ => return Err(unexpected(object)),
            },
            Decision::PatternObject => built = self.pattern_object(object, bundle, builder)?,
            Decision::ObservableRoots => built = self.observable_roots(object, builder)?,
            Decision::Vulnerability => match &object.kind {
                SourceKind::Vulnerability(source) => {
                    let attribute = source
                        .name
                        .as_deref()
                        .and_then(|name| OutputAttribute::new("vulnerability", name))
                        .ok_or_else(|| TranslationError::EmptyObject("vulnerability has no name".to_string()))?;
                    built
                        .attributes
                        .push(attribute.with_comment(source.description.clone()));
                }
                _ => return Err(unexpected(object)),
            },
        }
        Ok(built)
    }

    fn hinted_attribute(
        &self,
        object: &SourceObject,
        hint: &AttributeHint,
        builder: &ObjectBuilder<'_>,
    ) -> Result<OutputAttribute, TranslationError> {
        let (value, to_ids, timestamp, comment) = match &object.kind {
            SourceKind::Indicator(indicator) => {
                let pattern = stm_pattern::parse(&indicator.pattern)?;
                let value = self.rules.collapse(&pattern)?.value().to_string();
                (
                    value,
                    self.settings.pattern_to_ids,
                    indicator.valid_from.as_ref().map(epoch_seconds),
                    indicator.description.clone(),
                )
            }
            SourceKind::ObservedData(observed) => {
                let records = walk_records(&observed.objects)?;
                let value = builder
                    .observable_value(&hint.attribute_type, &records)
                    .ok_or_else(|| {
                        TranslationError::EmptyObject(format!(
                            "no observable value for {}",
                            hint.attribute_type
                        ))
                    })?;
                (
                    value,
                    self.settings.observable_to_ids,
                    observed.first_observed.as_ref().map(epoch_seconds),
                    observed.description.clone(),
                )
            }
            SourceKind::Vulnerability(vulnerability) => (
                vulnerability.name.clone().unwrap_or_default(),
                false,
                None,
                vulnerability.description.clone(),
            ),
            SourceKind::Custom(custom) => (
                custom.value.clone().unwrap_or_default(),
                false,
                custom.timestamp.as_deref().and_then(parse_epoch),
                custom.comment.clone(),
            ),
            _ => return Err(unexpected(object)),
        };

        let attribute = OutputAttribute::new(hint.attribute_type.as_str(), value).ok_or_else(|| {
            TranslationError::EmptyObject(format!("{} has an empty value", hint.attribute_type))
        })?;
        Ok(attribute
            .with_category(hint.category.clone())
            .with_to_ids(hint.to_ids.unwrap_or(to_ids))
            .with_timestamp(timestamp)
            .with_comment(comment))
    }

    fn hinted_object(
        &self,
        object: &SourceObject,
        hint: &ObjectHint,
        builder: &ObjectBuilder<'_>,
    ) -> Result<Built, TranslationError> {
        match &object.kind {
            SourceKind::Indicator(indicator) => {
                let pattern = stm_pattern::parse(&indicator.pattern)?;
                if pattern.joiner == Joiner::Or && pattern.clauses.len() > 1 {
                    return Err(TranslationError::UnsupportedPatternShape(
                        "OR pattern cannot describe one object".to_string(),
                    ));
                }
                let spec = ObjectSpec {
                    category: hint.category,
                    meta_category: hint.meta_category.clone(),
                    timestamp: indicator.valid_from.as_ref().map(epoch_seconds),
                    to_ids: hint.to_ids.unwrap_or(self.settings.pattern_to_ids),
                };
                builder.build_object(&spec, &FieldGroups::from_pattern(&pattern))
            }
            SourceKind::ObservedData(observed) => {
                let walk = ObservableWalker::new(&observed.objects).walk();
                if walk.records.is_empty() {
                    return Err(first_failure(walk.failures, object));
                }
                let spec = ObjectSpec {
                    category: hint.category,
                    meta_category: hint.meta_category.clone(),
                    timestamp: observed.first_observed.as_ref().map(epoch_seconds),
                    to_ids: hint.to_ids.unwrap_or(self.settings.observable_to_ids),
                };
                let mut built = builder.build_object(&spec, &FieldGroups::from_records(&walk.records))?;
                built.warnings.extend(walk.failures.into_iter().map(|(_, err)| err));
                Ok(built)
            }
            _ => Err(unexpected(object)),
        }
    }

    /// Un-hinted indicator: the raw pattern object, plus one attribute per
    /// `OR` alternative or one for a single (possibly composite) value.
    fn pattern_object(
        &self,
        object: &SourceObject,
        bundle: &Bundle,
        builder: &ObjectBuilder<'_>,
    ) -> Result<Built, TranslationError> {
        let SourceKind::Indicator(indicator) = &object.kind else {
            return Err(unexpected(object));
        };
        let timestamp = indicator.valid_from.as_ref().map(epoch_seconds);
        let to_ids = self.settings.pattern_to_ids;

        let mut built = Built::default();
        built.objects.push(builder.pattern_object(
            &indicator.pattern,
            bundle.spec_version.as_deref(),
            timestamp,
            to_ids,
        )?);

        let pattern = match stm_pattern::parse(&indicator.pattern) {
            Ok(pattern) => pattern,
            Err(err) => {
                built.warnings.push(err.into());
                return Ok(built);
            }
        };

        let values: Vec<(String, String)> = if pattern.joiner == Joiner::Or {
            let mapper = FieldMapper::new(&self.tables, &self.settings.custom_field_prefix);
            pattern
                .significant_clauses()
                .filter_map(|clause| {
                    let key = clause.key();
                    match mapper.map_attribute(&key) {
                        Some(attribute_type) => Some((attribute_type, clause.value.as_value())),
                        None => {
                            built.unmapped.push(key);
                            None
                        }
                    }
                })
                .collect()
        } else {
            match self.rules.collapse(&pattern) {
                Ok(Collapsed::Single { key, value }) => {
                    let mapper = FieldMapper::new(&self.tables, &self.settings.custom_field_prefix);
                    match mapper.map_attribute(&key) {
                        Some(attribute_type) => vec![(attribute_type, value)],
                        None => {
                            built.unmapped.push(key);
                            Vec::new()
                        }
                    }
                }
                Ok(Collapsed::Composite(composite)) => vec![(composite.attribute_type, composite.value)],
                Err(err) => {
                    debug!(object_id = %object.id, reason = %err, "pattern kept only as an object");
                    Vec::new()
                }
            }
        };

        built.attributes.extend(values.into_iter().filter_map(|(attribute_type, value)| {
            OutputAttribute::new(attribute_type, value).map(|a| {
                a.with_to_ids(to_ids)
                    .with_timestamp(timestamp)
                    .with_comment(indicator.description.clone())
            })
        }));
        Ok(built)
    }

    /// Un-hinted observed data: each root alone becomes an attribute when
    /// it is a single typed value, otherwise an object of its category.
    fn observable_roots(&self, object: &SourceObject, builder: &ObjectBuilder<'_>) -> Result<Built, TranslationError> {
        let SourceKind::ObservedData(observed) = &object.kind else {
            return Err(unexpected(object));
        };
        let timestamp = observed.first_observed.as_ref().map(epoch_seconds);
        let to_ids = self.settings.observable_to_ids;
        let mapper = FieldMapper::new(&self.tables, &self.settings.custom_field_prefix);

        let walk = ObservableWalker::new(&observed.objects).walk();
        let mut built = Built::default();
        let mut failures: Vec<TranslationError> = walk.failures.into_iter().map(|(_, err)| err).collect();

        for record in &walk.records {
            if let [field] = record.fields.as_slice() {
                if let Some(attribute_type) = mapper.map_attribute(&field.key) {
                    built.attributes.extend(
                        OutputAttribute::new(attribute_type, field.value.as_str())
                            .map(|a| a.with_to_ids(to_ids).with_timestamp(timestamp)),
                    );
                    continue;
                }
            }
            let Some(category) = ObjectCategory::for_observable_type(&record.object_type) else {
                failures.push(TranslationError::UnsupportedObject(format!(
                    "observable {} of type {}",
                    record.id, record.object_type
                )));
                continue;
            };
            let spec = ObjectSpec {
                category,
                meta_category: None,
                timestamp,
                to_ids,
            };
            match builder.build_object(&spec, &FieldGroups::from_records(slice::from_ref(record))) {
                Ok(part) => built.absorb(part),
                Err(err) => failures.push(err),
            }
        }

        if built.is_empty() {
            return Err(failures
                .into_iter()
                .next()
                .unwrap_or_else(|| TranslationError::EmptyObject("observed-data has no objects".to_string())));
        }
        built.warnings.extend(failures);
        Ok(built)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records of a graph that must resolve completely.
fn walk_records(objects: &BTreeMap<String, ObservableSubObject>) -> Result<Vec<FlatRecord>, TranslationError> {
    let walk = ObservableWalker::new(objects).walk();
    if let Some((_, err)) = walk.failures.into_iter().next() {
        return Err(err);
    }
    Ok(walk.records)
}

fn first_failure(failures: Vec<(String, TranslationError)>, object: &SourceObject) -> TranslationError {
    failures
        .into_iter()
        .next()
        .map_or_else(|| TranslationError::EmptyObject(format!("{} has no observables", object.id)), |(_, err)| err)
}

fn unexpected(object: &SourceObject) -> TranslationError {
    TranslationError::MalformedHint(format!(
        "hint does not fit a {} object",
        object.type_name()
    ))
}

/// Append one object's output to the event. Galaxies with the same type and
/// name share one entry.
fn merge(event: &mut OutputEvent, report: &mut RunReport, object_id: &str, built: Built) {
    event.attributes.extend(built.attributes);
    event.objects.extend(built.objects);
    for galaxy in built.galaxies {
        merge_galaxy(&mut event.galaxies, galaxy);
    }
    for warning in &built.warnings {
        warn!(object_id, kind = %warning.kind(), reason = %warning, "partial translation");
        report.record_warning(object_id, warning);
    }
    for key in &built.unmapped {
        debug!(object_id, key = %key, "unmapped field");
        report.record_unmapped(key);
    }
}

fn merge_galaxy(galaxies: &mut Vec<Galaxy>, galaxy: Galaxy) {
    match galaxies
        .iter_mut()
        .find(|g| g.galaxy_type == galaxy.galaxy_type && g.name == galaxy.name)
    {
        Some(existing) => existing.clusters.extend(galaxy.clusters),
        None => galaxies.push(galaxy),
    }
}
