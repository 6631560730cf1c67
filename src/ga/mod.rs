//! A bitstring genetic algorithm used to fit bounded parameters.

use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use log::debug;
use crate::error::FittingError;


/// Candidate solution encoded as a string of `'0'` and `'1'`
#[derive(Debug, Clone)]
pub struct BitString {
    pub string: String
}

impl BitString {
    fn check(&self) -> Result<(), FittingError> {
        if self.string.chars().any(|i| i != '1' && i != '0') {
            return Err(FittingError::NonBinary(self.string.clone()));
        }

        Ok(())
    }

    fn set(&mut self, new_string: String) -> Result<(), FittingError> {
        self.string = new_string;

        self.check()
    }

    fn length(&self) -> usize {
        self.string.len()
    }
}

/// Settings of the genetic algorithm
#[derive(Debug, Clone)]
pub struct GeneticAlgorithmParameters {
    /// Lower and upper bound of each parameter
    pub bounds: Vec<(f64, f64)>,
    /// Bits used to encode each parameter
    pub n_bits: usize,
    /// Number of generations
    pub n_iter: usize,
    /// Population size, rounded up to an even number
    pub n_pop: usize,
    /// Crossover rate
    pub r_cross: f64,
    /// Mutation rate per bit
    pub r_mut: f64,
    /// Tournament size
    pub k: usize,
    /// Seed of the random number generator
    pub seed: u64,
}

impl Default for GeneticAlgorithmParameters {
    fn default() -> Self {
        GeneticAlgorithmParameters {
            bounds: vec![],
            n_bits: 16,
            n_iter: 60,
            n_pop: 40,
            r_cross: 0.9,
            r_mut: 1. / 16.,
            k: 3,
            seed: 1,
        }
    }
}

fn crossover(parent1: &BitString, parent2: &BitString, r_cross: f64, rng: &mut StdRng) -> Result<(BitString, BitString), FittingError> {
    let (mut clone1, mut clone2) = (parent1.clone(), parent2.clone());

    if parent1.length() > 1 && rng.gen::<f64>() <= r_cross {
        let crossover_point = rng.gen_range(1..parent1.length());

        let string1 = format!("{}{}", &parent1.string[0..crossover_point], &parent2.string[crossover_point..]);
        let string2 = format!("{}{}", &parent2.string[0..crossover_point], &parent1.string[crossover_point..]);

        clone1.set(string1)?;
        clone2.set(string2)?;
    }

    Ok((clone1, clone2))
}

fn mutate(bitstring: &mut BitString, r_mut: f64, rng: &mut StdRng) {
    // in place bit flips
    bitstring.string = bitstring.string.chars()
        .map(|bit| {
            if rng.gen::<f64>() <= r_mut {
                if bit == '1' { '0' } else { '1' }
            } else {
                bit
            }
        })
        .collect();
}

fn selection<'a>(pop: &'a [BitString], scores: &[f64], k: usize, rng: &mut StdRng) -> &'a BitString {
    let mut selection_index = rng.gen_range(0..pop.len());

    // tournament selection
    for _ in 1..k.max(1) {
        let i = rng.gen_range(0..pop.len());
        if scores[i] < scores[selection_index] {
            selection_index = i;
        }
    }

    &pop[selection_index]
}

/// Decodes a bitstring into one value per bound, each parameter uses `n_bits` bits
pub fn decode(bitstring: &BitString, bounds: &[(f64, f64)], n_bits: usize) -> Result<Vec<f64>, FittingError> {
    if n_bits == 0 || n_bits >= 64 || bitstring.length() % n_bits != 0 || bounds.len() != bitstring.length() / n_bits {
        return Err(FittingError::BoundsMismatch);
    }

    let maximum = (2_u64.pow(n_bits as u32) - 1) as f64;

    bounds.iter()
        .enumerate()
        .map(|(i, (lower, upper))| {
            let substring = &bitstring.string[i * n_bits..(i + 1) * n_bits];
            let value = u64::from_str_radix(substring, 2)
                .map_err(|_| FittingError::NonBinary(String::from(substring)))? as f64;

            Ok(value * (upper - lower) / maximum + lower)
        })
        .collect()
}

fn create_random_string(length: usize, rng: &mut StdRng) -> BitString {
    let string = (0..length)
        .map(|_| if rng.gen::<f64>() <= 0.5 { '0' } else { '1' })
        .collect();

    BitString { string }
}

/// Minimizes the objective over the bounded parameters, the objective is given the decoded
/// parameters and scored in parallel, returns the best bitstring, its score and the scores of
/// every generation
pub fn genetic_algo<F>(
    f: F,
    params: &GeneticAlgorithmParameters,
) -> Result<(BitString, f64, Vec<Vec<f64>>), FittingError>
where
    F: Fn(&[f64]) -> Result<f64, FittingError> + Sync,
{
    if params.bounds.is_empty() || params.n_bits == 0 || params.n_bits > 32 {
        return Err(FittingError::BoundsMismatch);
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let n_pop = (params.n_pop.max(2) + 1) / 2 * 2;
    let length = params.n_bits * params.bounds.len();

    let objective = |bitstring: &BitString| -> Result<f64, FittingError> {
        f(&decode(bitstring, &params.bounds, params.n_bits)?)
    };

    let mut pop: Vec<BitString> = (0..n_pop)
        .map(|_| create_random_string(length, &mut rng))
        .collect();

    let mut best = pop[0].clone();
    let mut best_eval = objective(&best)?;

    let mut all_scores = vec![];

    for gen in 0..params.n_iter {
        let scores = pop.par_iter()
            .map(|bitstring| objective(bitstring))
            .collect::<Result<Vec<f64>, FittingError>>()?;

        for (candidate, score) in pop.iter().zip(scores.iter()) {
            if *score < best_eval {
                best = candidate.clone();
                best_eval = *score;
                debug!("gen: {}, new string: {}, score: {}", gen + 1, candidate.string, score);
            }
        }

        let selected: Vec<BitString> = (0..n_pop)
            .map(|_| selection(&pop, &scores, params.k, &mut rng).clone())
            .collect();

        all_scores.push(scores);

        let mut children = Vec::with_capacity(n_pop);
        for pair in selected.chunks(2) {
            let (mut child1, mut child2) = crossover(&pair[0], &pair[1], params.r_cross, &mut rng)?;
            mutate(&mut child1, params.r_mut, &mut rng);
            mutate(&mut child2, params.r_mut, &mut rng);
            children.push(child1);
            children.push(child2);
        }

        pop = children;
    }

    Ok((best, best_eval, all_scores))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_bounds() {
        let bounds = vec![(0., 1.), (-10., 10.)];

        let low = BitString { string: String::from("00000000") };
        let high = BitString { string: String::from("11111111") };

        assert_eq!(decode(&low, &bounds, 4).unwrap(), vec![0., -10.]);
        assert_eq!(decode(&high, &bounds, 4).unwrap(), vec![1., 10.]);
        assert!(decode(&low, &bounds, 3).is_err());
    }

    #[test]
    fn test_decode_rejects_wide_parameters() {
        let wide = BitString { string: "1".repeat(64) };
        assert!(matches!(decode(&wide, &[(0., 1.)], 64), Err(FittingError::BoundsMismatch)));

        let widest = BitString { string: "1".repeat(63) };
        assert_eq!(decode(&widest, &[(0., 1.)], 63).unwrap(), vec![1.]);

        let params = GeneticAlgorithmParameters {
            bounds: vec![(0., 1.)],
            n_bits: 64,
            ..GeneticAlgorithmParameters::default()
        };
        assert!(matches!(genetic_algo(|x| Ok(x[0]), &params), Err(FittingError::BoundsMismatch)));
    }

    #[test]
    fn test_minimizes_parabola() {
        let params = GeneticAlgorithmParameters {
            bounds: vec![(-5., 5.)],
            ..GeneticAlgorithmParameters::default()
        };

        let (best, score, all_scores) = genetic_algo(|x| Ok((x[0] - 1.5).powi(2)), &params).unwrap();
        let decoded = decode(&best, &params.bounds, params.n_bits).unwrap();

        assert_eq!(all_scores.len(), params.n_iter);
        assert!(score < 0.01);
        assert!((decoded[0] - 1.5).abs() < 0.1);
    }
}
