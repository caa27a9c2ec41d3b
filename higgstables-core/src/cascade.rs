//! The selection-and-classification cascade
//!
//! One run evaluates a single event population in three strictly ordered
//! phases:
//!
//! 1. triggers, each adding its rejections to `unselected` without narrowing
//!    the population,
//! 2. preselections, ANDed into a keep mask,
//! 3. categories, which claim kept events first-come first-served.

use crate::config::{CascadeConfig, Category};
use crate::resolver::VariableResolver;
use crate::source::EventSource;
use crate::trigger::Selector;
use crate::types::{count_selected, CascadeResult, Mask, Result, TablesError};

/// Runs a validated configuration against event populations
pub struct SelectionCascade<'c> {
    config: &'c CascadeConfig,
}

impl<'c> SelectionCascade<'c> {
    pub fn new(config: &'c CascadeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CascadeConfig {
        self.config
    }

    /// Partition the population of one source into category counts
    ///
    /// Any error (missing variable, length mismatch, bad histogram index)
    /// aborts this source only; the caller decides what to do with it.
    pub fn run<S: EventSource + ?Sized>(&self, source: &S) -> Result<CascadeResult> {
        let mut resolver = VariableResolver::new(source);

        let trigger_rejections = self.trigger_phase(&mut resolver)?;
        let (keep, preselection_rejections) = self.preselection_phase(&mut resolver)?;
        let (categories, leftover) = self.category_phase(&mut resolver, keep)?;

        let result = CascadeResult {
            n_events: resolver.n_events().unwrap_or_default(),
            unselected: trigger_rejections + preselection_rejections,
            categories,
            leftover,
        };

        log::debug!(
            "{} events: {} rejected by triggers, {} by preselections",
            result.n_events,
            trigger_rejections,
            preselection_rejections
        );
        if leftover > 0 {
            log::warn!(
                "{} preselected events are not claimed by any category",
                leftover
            );
        }
        Ok(result)
    }

    fn trigger_phase<S: EventSource + ?Sized>(
        &self,
        resolver: &mut VariableResolver<'_, S>,
    ) -> Result<u64> {
        let mut rejected = 0u64;
        for trigger in &self.config.triggers {
            let step = trigger.rejected(resolver)?;
            log::trace!("{} trigger on `{}` rejects {}", trigger.kind(), trigger.tree(), step);
            rejected += step;
        }
        Ok(rejected)
    }

    /// Keep mask (`None` when there are no preselections) and its rejections
    fn preselection_phase<S: EventSource + ?Sized>(
        &self,
        resolver: &mut VariableResolver<'_, S>,
    ) -> Result<(Option<Mask>, u64)> {
        let keep = self
            .config
            .preselections
            .iter()
            .try_fold(None, |keep: Option<Mask>, selector: &Selector| {
                let mask = selector.mask(resolver)?;
                Ok::<_, TablesError>(Some(match keep {
                    Some(keep) => keep.into_iter().zip(mask).map(|(k, m)| k && m).collect(),
                    None => mask,
                }))
            })?;

        let rejected = keep
            .as_ref()
            .map(|keep| keep.len() as u64 - count_selected(keep))
            .unwrap_or(0);
        Ok((keep, rejected))
    }

    /// Per-category counts and the number of kept events left unclaimed
    fn category_phase<S: EventSource + ?Sized>(
        &self,
        resolver: &mut VariableResolver<'_, S>,
        keep: Option<Mask>,
    ) -> Result<(Vec<(String, u64)>, u64)> {
        let (remaining, counts) = self.config.categories.iter().try_fold(
            (keep, Vec::with_capacity(self.config.categories.len())),
            |(remaining, mut counts), category: &Category| {
                let in_category = category.selector.mask(resolver)?;
                let remaining = remaining.unwrap_or_else(|| vec![true; in_category.len()]);

                let count = remaining
                    .iter()
                    .zip(&in_category)
                    .filter(|&(&r, &c)| r && c)
                    .count() as u64;
                log::trace!("category `{}`: {}", category.name, count);
                counts.push((category.name.clone(), count));

                let remaining: Mask = remaining
                    .into_iter()
                    .zip(in_category)
                    .map(|(r, c)| r && !c)
                    .collect();
                Ok::<_, TablesError>((Some(remaining), counts))
            },
        )?;

        let leftover = remaining.as_deref().map(count_selected).unwrap_or(0);
        Ok((counts, leftover))
    }
}
