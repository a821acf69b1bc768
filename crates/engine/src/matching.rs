//! String scoring shared by the category resolver and the choice menus.
//!
//! All functions expect keys already passed through `normalize_key`.

/// Weight of a registry phrase found inside the input (`便當` in `雞腿便當`).
pub const PHRASE_IN_INPUT_WEIGHT: f64 = 0.9;
/// Weight of the input found inside a registry phrase (`捷運` in `捷運悠遊卡`).
pub const INPUT_IN_PHRASE_WEIGHT: f64 = 0.8;
/// Shortest substring, in characters, a containment match may rest on.
pub const MIN_CONTAINED_CHARS: usize = 2;

/// A containment hit with the share of the longer string it covers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Containment {
    pub score: f64,
    pub coverage: f64,
}

/// Registry phrase contained in the input.
pub fn phrase_in_input(input: &str, phrase: &str) -> Option<Containment> {
    contained(phrase, input, PHRASE_IN_INPUT_WEIGHT)
}

/// Input contained in the registry phrase.
pub fn input_in_phrase(input: &str, phrase: &str) -> Option<Containment> {
    contained(input, phrase, INPUT_IN_PHRASE_WEIGHT)
}

fn contained(needle: &str, haystack: &str, weight: f64) -> Option<Containment> {
    let needle_len = needle.chars().count();
    let haystack_len = haystack.chars().count();
    if needle_len < MIN_CONTAINED_CHARS || needle_len >= haystack_len {
        return None;
    }
    if !haystack.contains(needle) {
        return None;
    }
    let coverage = needle_len as f64 / haystack_len as f64;
    Some(Containment {
        score: coverage * weight,
        coverage,
    })
}

/// Normalised similarity: `1 - distance / max_len`, 1.0 for two empty keys.
pub fn similarity(left: &str, right: &str) -> f64 {
    let max_len = left.chars().count().max(right.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(left, right) as f64 / max_len as f64
}

pub fn levenshtein(left: &str, right: &str) -> usize {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();

    if left.is_empty() {
        return right.len();
    }
    if right.is_empty() {
        return left.len();
    }

    let mut costs: Vec<usize> = (0..=right.len()).collect();

    for (i, left_char) in left.iter().enumerate() {
        let mut last_cost = i;
        costs[0] = i + 1;
        for (j, right_char) in right.iter().enumerate() {
            let next_cost = costs[j + 1];
            let mut cost = if left_char == right_char {
                last_cost
            } else {
                last_cost + 1
            };
            cost = cost.min(costs[j] + 1).min(next_cost + 1);
            costs[j + 1] = cost;
            last_cost = next_cost;
        }
    }

    costs[right.len()]
}
