//! C6 — Model Allocator: priority-aware bin-packing of desired models
//! onto marketplace offers.
//!
//! Grounded on `original_source/llm_deploy/model_allocator.py`. The
//! original's `MODEL_RAM_OVERHEAD = 1` (GB) added directly to MB-scale
//! sizes is a unit bug; this implementation uses the MB-consistent
//! `MODEL_RAM_OVERHEAD_MB` constant per spec §4.6.

use crate::error::FleetError;
use crate::marketplace::OfferQuery;
use crate::types::{Allocation, DesiredModel, MODEL_RAM_OVERHEAD_MB, Offer, Priority, SizedModel};
use std::collections::HashMap;

/// Anything the allocator can query for fresh offers during its
/// acquisition pass. Implemented by `MarketplaceClient`; tests supply a
/// fake.
pub trait OfferSource {
    fn query_offers(
        &self,
        req: &OfferQuery,
    ) -> impl std::future::Future<Output = Result<Vec<Offer>, FleetError>> + Send;
}

/// Resolves a model identifier to a size in GB, or `None` if unknown —
/// treated by the allocator as a configuration error (spec §4.8).
pub trait SizeOracle {
    fn size_gb(&self, model_identifier: &str) -> Option<f64>;
}

#[derive(Debug, Default)]
pub struct AllocationResult {
    /// Machines in first-placement order, each with its models in
    /// placement order (spec §5 ordering guarantee).
    pub machines: Vec<(u64, Allocation)>,
    pub unplaceable: Vec<String>,
}

struct MachineState {
    offer: Offer,
    models: Vec<SizedModel>,
}

impl MachineState {
    fn total_consumption(&self) -> f64 {
        self.models.iter().map(SizedModel::consumption_mb).sum()
    }

    fn high_priority_consumption(&self) -> f64 {
        self.models
            .iter()
            .filter(|m| m.desired.priority == Priority::High)
            .map(SizedModel::consumption_mb)
            .sum()
    }

    fn available_ram(&self) -> f64 {
        self.offer.gpu_total_ram_mb - self.total_consumption()
    }
}

/// Resolves each desired model's size, sorts by `(priority desc, size
/// desc)`, then places them one at a time with a reuse pass followed by
/// an acquisition pass. Deterministic given identical offer responses.
pub async fn allocate_models<O: OfferSource>(
    desired: &[DesiredModel],
    oracle: &dyn SizeOracle,
    offers: &O,
) -> Result<AllocationResult, FleetError> {
    let mut sized = Vec::with_capacity(desired.len());
    for model in desired {
        let size_mb = oracle.size_gb(&model.model).ok_or_else(|| {
            FleetError::Config(format!("no known size for model identifier '{}'", model.model))
        })? * 1024.0;
        sized.push(SizedModel {
            desired: model.clone(),
            size_mb,
        });
    }

    sized.sort_by(|a, b| {
        b.desired
            .priority
            .weight()
            .cmp(&a.desired.priority.weight())
            .then(b.size_mb.partial_cmp(&a.size_mb).unwrap_or(std::cmp::Ordering::Equal))
    });

    let total_high_mb: f64 = sized
        .iter()
        .filter(|m| m.desired.priority == Priority::High)
        .map(|m| m.size_mb)
        .sum();

    let mut machines: Vec<MachineState> = Vec::new();
    let mut order: Vec<u64> = Vec::new();
    let mut unplaceable = Vec::new();

    for model in sized {
        if let Some(idx) = find_reusable_machine(&machines, &model) {
            machines[idx].models.push(model);
            continue;
        }

        let target_mb = match model.desired.priority {
            Priority::High => total_high_mb,
            Priority::Low => model.size_mb,
        };

        let query = OfferQuery {
            gpu_ram_mb: target_mb,
            ..OfferQuery::default()
        };

        let mut candidates: Vec<Offer> = offers
            .query_offers(&query)
            .await?
            .into_iter()
            .filter(|o| o.num_gpus <= 2)
            .collect();
        candidates.sort_by(|a, b| {
            b.total_flops
                .partial_cmp(&a.total_flops)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.dph_total.partial_cmp(&b.dph_total).unwrap_or(std::cmp::Ordering::Equal))
        });

        match candidates.into_iter().next() {
            Some(offer) => {
                let id = offer.id;
                order.push(id);
                machines.push(MachineState {
                    offer,
                    models: vec![model],
                });
            }
            None => {
                tracing::warn!(model = %model.desired.name, "no offer admits model, marking unplaceable");
                unplaceable.push(model.desired.name);
            }
        }
    }

    let by_id: HashMap<u64, MachineState> = machines.into_iter().map(|m| (m.offer.id, m)).collect();
    let mut by_id = by_id;
    let machines = order
        .into_iter()
        .map(|id| {
            let m = by_id.remove(&id).expect("machine recorded in order must exist");
            (
                id,
                Allocation {
                    offer: m.offer,
                    models: m.models,
                },
            )
        })
        .collect();

    Ok(AllocationResult { machines, unplaceable })
}

fn find_reusable_machine(machines: &[MachineState], model: &SizedModel) -> Option<usize> {
    machines.iter().position(|m| match model.desired.priority {
        Priority::High => m.high_priority_consumption() + model.consumption_mb() <= m.offer.gpu_total_ram_mb,
        Priority::Low => model.consumption_mb() <= m.available_ram(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    struct FixedOracle;
    impl SizeOracle for FixedOracle {
        fn size_gb(&self, model_identifier: &str) -> Option<f64> {
            match model_identifier {
                "mA" => Some(8.0),
                "mB" => Some(12.0),
                _ => None,
            }
        }
    }

    struct FixedOffers {
        offer: Offer,
    }
    impl OfferSource for FixedOffers {
        async fn query_offers(&self, _req: &OfferQuery) -> Result<Vec<Offer>, FleetError> {
            Ok(vec![self.offer.clone()])
        }
    }

    fn scenario_a_offer() -> Offer {
        Offer {
            id: 1,
            gpu_total_ram_mb: 24576.0,
            num_gpus: 1,
            dph_total: 0.5,
            total_flops: 100.0,
            inet_up: 1.0,
            inet_down: 1.0,
            verification: "verified".into(),
            static_ip: true,
            disk_space: 100.0,
        }
    }

    #[tokio::test]
    async fn scenario_a_allocates_both_models_to_one_machine() {
        let desired = vec![
            DesiredModel {
                name: "A".into(),
                model: "mA".into(),
                priority: Priority::High,
            },
            DesiredModel {
                name: "B".into(),
                model: "mB".into(),
                priority: Priority::Low,
            },
        ];
        let offers = FixedOffers {
            offer: scenario_a_offer(),
        };
        let result = allocate_models(&desired, &FixedOracle, &offers).await.unwrap();

        assert_eq!(result.machines.len(), 1);
        assert!(result.unplaceable.is_empty());
        let (id, allocation) = &result.machines[0];
        assert_eq!(*id, 1);
        assert_eq!(allocation.models.len(), 2);

        let disk_gb = allocation.disk_gb();
        assert!((disk_gb - 24.8828125).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unknown_model_identifier_is_config_error() {
        struct NoneOracle;
        impl SizeOracle for NoneOracle {
            fn size_gb(&self, _: &str) -> Option<f64> {
                None
            }
        }
        let desired = vec![DesiredModel {
            name: "A".into(),
            model: "unknown".into(),
            priority: Priority::High,
        }];
        let offers = FixedOffers {
            offer: scenario_a_offer(),
        };
        let err = allocate_models(&desired, &NoneOracle, &offers).await.unwrap_err();
        assert!(matches!(err, FleetError::Config(_)));
    }

    #[tokio::test]
    async fn capacity_invariant_holds() {
        let desired = vec![
            DesiredModel {
                name: "A".into(),
                model: "mA".into(),
                priority: Priority::High,
            },
            DesiredModel {
                name: "B".into(),
                model: "mB".into(),
                priority: Priority::Low,
            },
        ];
        let offers = FixedOffers {
            offer: scenario_a_offer(),
        };
        let result = allocate_models(&desired, &FixedOracle, &offers).await.unwrap();
        for (_, allocation) in &result.machines {
            let total: f64 = allocation.models.iter().map(SizedModel::consumption_mb).sum();
            assert!(total <= allocation.offer.gpu_total_ram_mb);
        }
    }

    #[test]
    fn overhead_constant_is_megabytes_not_gigabytes() {
        assert_eq!(MODEL_RAM_OVERHEAD_MB, 1024.0);
    }
}
