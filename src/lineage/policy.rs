use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{batch, recipe};
use crate::errors::ServiceError;

/// Which recipe mixes a blend may combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BlendCompatibility {
    #[default]
    Any,
    SameRecipe,
    SameStyle,
}

/// Per-tenant lineage rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineagePolicy {
    pub packaging_tolerance_liters: f64,
    pub conditioning_duration_days: u32,
    pub blend_compatibility: BlendCompatibility,
}

impl Default for LineagePolicy {
    fn default() -> Self {
        Self {
            packaging_tolerance_liters: 1.0,
            conditioning_duration_days: 7,
            blend_compatibility: BlendCompatibility::Any,
        }
    }
}

impl LineagePolicy {
    /// Rejects a blend whose source batches break the tenant's recipe rule.
    ///
    /// Batches without a recipe only pass under [`BlendCompatibility::Any`].
    pub fn check_blend_compatibility(
        &self,
        batches: &[batch::Model],
        recipes: &[recipe::Model],
    ) -> Result<(), ServiceError> {
        match self.blend_compatibility {
            BlendCompatibility::Any => Ok(()),
            BlendCompatibility::SameRecipe => {
                let mut ids = batches.iter().map(|b| b.recipe_id);
                let first = ids.next().flatten();
                if first.is_some() && ids.all(|id| id == first) {
                    Ok(())
                } else {
                    Err(ServiceError::IncompatibleBlend(
                        "all source batches must share one recipe".to_string(),
                    ))
                }
            }
            BlendCompatibility::SameStyle => {
                let style_of = |b: &batch::Model| {
                    b.recipe_id
                        .and_then(|rid| recipes.iter().find(|r| r.id == rid))
                        .and_then(|r| r.style.as_deref())
                        .map(|s| s.trim().to_lowercase())
                };
                let mut styles = batches.iter().map(style_of);
                let first = styles.next().flatten();
                if first.is_some() && styles.all(|s| s == first) {
                    Ok(())
                } else {
                    Err(ServiceError::IncompatibleBlend(
                        "all source batches must share one beer style".to_string(),
                    ))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use uuid::Uuid;

    fn batch_with(recipe_id: Option<Uuid>) -> batch::Model {
        let now = Utc::now();
        batch::Model {
            id: Uuid::new_v4(),
            tenant_id: "t".into(),
            batch_number: "B".into(),
            recipe_id,
            status: "READY".into(),
            volume: 100.0,
            packaged_volume: 0.0,
            original_gravity: None,
            current_gravity: None,
            final_gravity: None,
            tank_id: None,
            brew_date: None,
            completed_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn recipe_with(style: &str) -> recipe::Model {
        recipe::Model {
            id: Uuid::new_v4(),
            tenant_id: "t".into(),
            name: "R".into(),
            style: Some(style.into()),
            created_at: Utc::now(),
        }
    }

    fn policy(compat: BlendCompatibility) -> LineagePolicy {
        LineagePolicy {
            blend_compatibility: compat,
            ..Default::default()
        }
    }

    #[test]
    fn any_accepts_everything() {
        let batches = vec![batch_with(None), batch_with(Some(Uuid::new_v4()))];
        assert!(policy(BlendCompatibility::Any)
            .check_blend_compatibility(&batches, &[])
            .is_ok());
    }

    #[test]
    fn same_recipe_requires_a_shared_recipe() {
        let rid = Uuid::new_v4();
        let p = policy(BlendCompatibility::SameRecipe);
        assert!(p
            .check_blend_compatibility(&[batch_with(Some(rid)), batch_with(Some(rid))], &[])
            .is_ok());
        assert_matches!(
            p.check_blend_compatibility(
                &[batch_with(Some(rid)), batch_with(Some(Uuid::new_v4()))],
                &[]
            ),
            Err(ServiceError::IncompatibleBlend(_))
        );
        assert_matches!(
            p.check_blend_compatibility(&[batch_with(None), batch_with(None)], &[]),
            Err(ServiceError::IncompatibleBlend(_))
        );
    }

    #[test]
    fn same_style_compares_recipe_styles() {
        let ipa_a = recipe_with("IPA");
        let ipa_b = recipe_with("ipa ");
        let stout = recipe_with("Stout");
        let p = policy(BlendCompatibility::SameStyle);
        let recipes = vec![ipa_a.clone(), ipa_b.clone(), stout.clone()];

        assert!(p
            .check_blend_compatibility(
                &[batch_with(Some(ipa_a.id)), batch_with(Some(ipa_b.id))],
                &recipes
            )
            .is_ok());
        assert_matches!(
            p.check_blend_compatibility(
                &[batch_with(Some(ipa_a.id)), batch_with(Some(stout.id))],
                &recipes
            ),
            Err(ServiceError::IncompatibleBlend(_))
        );
    }
}
