use crate::engine::state::Candidate;

/// Keeps the `max_candidates` best candidates.
///
/// The sort is stable, so equal scores keep their enumeration order.
pub fn run(mut candidates: Vec<Candidate>, max_candidates: usize) -> Vec<Candidate> {
    candidates.sort_by(Candidate::by_score_descending);
    candidates.truncate(max_candidates);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::FitAccumulator;

    #[test]
    fn keeps_best_candidates_in_order() {
        let scores = [0.5, 2.0, 1.0, 2.0, -1.0];
        let candidates = scores
            .iter()
            .enumerate()
            .map(|(index, &score)| Candidate {
                index,
                dihedrals: Vec::new(),
                coordinates: Vec::new(),
                atom_density: Vec::new(),
                fit: FitAccumulator::default(),
                score,
            })
            .collect();

        let kept = run(candidates, 3);
        let order: Vec<_> = kept.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![1, 3, 2]);
    }
}
