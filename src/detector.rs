/**
 * CHANGE DETECTOR - Débouncing des transitions online/offline
 *
 * RÔLE : décider, échantillon par échantillon, quelles transitions méritent
 * une alerte. Politique : single-shot au franchissement du seuil.
 *
 * - Failed part une seule fois, quand le compteur d'échecs consécutifs
 *   atteint le seuil ; les cycles offline suivants restent silencieux
 * - Recovered part uniquement au retour online après un Failed notifié
 * - La toute première observation d'une cible n'alerte jamais
 *
 * Une cible qui bagote sous le seuil ne produit donc aucune alerte, dans un
 * sens comme dans l'autre.
 */
use crate::models::{CountersMap, FailureCounter, Target, TransitionKind};
use crate::state::Shared;
use std::collections::hash_map::Entry;

pub struct ChangeDetector {
    threshold: u32,
    counters: Shared<CountersMap>,
}

impl ChangeDetector {
    /// La map des compteurs est partagée pour que /status puisse l'exposer ;
    /// seul le sampler appelle `observe`.
    pub fn new(threshold: u32, counters: Shared<CountersMap>) -> Self {
        Self { threshold: threshold.max(1), counters }
    }

    pub fn observe(&self, target: &Target, online: bool) -> Option<TransitionKind> {
        let mut counters = self.counters.lock();

        let counter = match counters.entry(target.name.clone()) {
            Entry::Vacant(slot) => {
                // démarrage à froid : on initialise sans jamais notifier
                slot.insert(FailureCounter {
                    kind: target.kind,
                    consecutive_failures: if online { 0 } else { 1 },
                    last_known_online: online.then_some(true),
                });
                return None;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        if online {
            counter.consecutive_failures = 0;
            let was_notified_down = counter.last_known_online == Some(false);
            counter.last_known_online = Some(true);
            return was_notified_down.then_some(TransitionKind::Recovered);
        }

        counter.consecutive_failures += 1;
        if counter.consecutive_failures >= self.threshold
            && counter.last_known_online != Some(false)
        {
            counter.last_known_online = Some(false);
            return Some(TransitionKind::Failed);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetKind;
    use crate::state::new_state;
    use std::collections::HashMap;

    fn detector(threshold: u32) -> ChangeDetector {
        ChangeDetector::new(threshold, new_state(HashMap::new()))
    }

    fn host(name: &str) -> Target {
        Target { name: name.into(), kind: TargetKind::Host }
    }

    #[test]
    fn test_first_sample_never_notifies() {
        let det = detector(3);
        assert_eq!(det.observe(&host("a"), true), None);
        assert_eq!(det.observe(&host("b"), false), None);
    }

    #[test]
    fn test_threshold_gated_single_shot() {
        let det = detector(3);
        let x = host("x");
        // cycles 1 et 2 offline : silence
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, false), None);
        // cycle 3 : exactement une alerte Failed
        assert_eq!(det.observe(&x, false), Some(TransitionKind::Failed));
        // cycles 4 et 5 toujours offline : pas de répétition
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, false), None);
        // cycle 6 online : exactement une alerte Recovered
        assert_eq!(det.observe(&x, true), Some(TransitionKind::Recovered));
        // et pas de seconde
        assert_eq!(det.observe(&x, true), None);
    }

    #[test]
    fn test_flapping_below_threshold_is_silent() {
        let det = detector(3);
        let x = host("x");
        det.observe(&x, true);
        // deux échecs puis retour online : aucune alerte dans aucun sens
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, true), None);
        // le compteur est bien reparti de zéro
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, false), Some(TransitionKind::Failed));
    }

    #[test]
    fn test_cold_start_offline_counts_toward_threshold() {
        let det = detector(3);
        let x = host("x");
        // la première observation compte comme premier échec
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, false), Some(TransitionKind::Failed));
    }

    #[test]
    fn test_cold_start_offline_then_online_is_not_a_recovery() {
        let det = detector(3);
        let x = host("x");
        det.observe(&x, false);
        // jamais notifié down : le retour online reste silencieux
        assert_eq!(det.observe(&x, true), None);
    }

    #[test]
    fn test_recovery_rearms_the_trigger() {
        let det = detector(2);
        let x = host("x");
        det.observe(&x, true);
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, false), Some(TransitionKind::Failed));
        assert_eq!(det.observe(&x, true), Some(TransitionKind::Recovered));
        // nouvelle panne : le seuil s'applique à nouveau
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, false), Some(TransitionKind::Failed));
    }

    #[test]
    fn test_threshold_one_still_suppresses_cold_start() {
        let det = detector(1);
        let x = host("x");
        // première observation : silence même à seuil 1
        assert_eq!(det.observe(&x, false), None);
        // l'échec suivant déclenche
        assert_eq!(det.observe(&x, false), Some(TransitionKind::Failed));
        assert_eq!(det.observe(&x, false), None);
        assert_eq!(det.observe(&x, true), Some(TransitionKind::Recovered));
        assert_eq!(det.observe(&x, false), Some(TransitionKind::Failed));
    }

    #[test]
    fn test_counters_are_visible_for_status() {
        let counters = new_state(HashMap::new());
        let det = ChangeDetector::new(3, counters.clone());
        let x = host("x");
        det.observe(&x, false);
        det.observe(&x, false);

        let map = counters.lock();
        let counter = map.get("x").unwrap();
        assert_eq!(counter.consecutive_failures, 2);
        assert_eq!(counter.kind, TargetKind::Host);
    }
}
