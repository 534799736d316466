/// The 48-slot ring of Greek letter words used to disambiguate handler
/// names of instances sharing a `(service, version)` pair: the 24
/// lowercase words followed by the 24 capitalized ones.
pub const GREEK_ALPHABET: [&str; 48] = [
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "omicron", "pi", "rho", "sigma", "tau", "upsilon", "phi", "chi",
    "psi", "omega", "Alpha", "Beta", "Gamma", "Delta", "Epsilon", "Zeta", "Eta", "Theta", "Iota",
    "Kappa", "Lambda", "Mu", "Nu", "Xi", "Omicron", "Pi", "Rho", "Sigma", "Tau", "Upsilon", "Phi",
    "Chi", "Psi", "Omega",
];

/// The Greek word for a slot index, wrapping modulo the ring size.
pub fn word(index: usize) -> &'static str {
    GREEK_ALPHABET[index % GREEK_ALPHABET.len()]
}

/// The slot index of a Greek word, when it is one of the ring.
pub fn slot_of(word: &str) -> Option<usize> {
    GREEK_ALPHABET.iter().position(|w| *w == word)
}

/// The smallest slot index not occupied by any of the given Greek words,
/// or `None` when the whole ring is occupied. Words outside the ring are
/// ignored.
pub fn smallest_free_slot<'a>(occupied: impl IntoIterator<Item = &'a str>) -> Option<usize> {
    let mut taken = [false; GREEK_ALPHABET.len()];
    for word in occupied {
        if let Some(slot) = slot_of(word) {
            taken[slot] = true;
        }
    }
    taken.iter().position(|t| !t)
}

#[cfg(test)]
mod test {
    use super::{slot_of, smallest_free_slot, word, GREEK_ALPHABET};

    #[test]
    fn test_ring_layout() {
        assert_eq!(GREEK_ALPHABET.len(), 48);
        assert_eq!(word(0), "alpha");
        assert_eq!(word(2), "gamma");
        assert_eq!(word(23), "omega");
        assert_eq!(word(24), "Alpha");
        assert_eq!(word(47), "Omega");
        assert_eq!(word(48), "alpha"); // wraps

        for (slot, w) in GREEK_ALPHABET.iter().enumerate() {
            assert_eq!(slot_of(w), Some(slot));
        }
        assert_eq!(slot_of("aleph"), None);
    }

    #[test]
    fn test_smallest_free_slot() {
        assert_eq!(smallest_free_slot([]), Some(0));
        assert_eq!(smallest_free_slot(["alpha", "beta"]), Some(2));
        // Vacated slots are reused before fresh ones.
        assert_eq!(smallest_free_slot(["alpha", "gamma"]), Some(1));
        // Unknown words don't occupy anything.
        assert_eq!(smallest_free_slot(["aleph"]), Some(0));

        let full: Vec<&str> = GREEK_ALPHABET.to_vec();
        assert_eq!(smallest_free_slot(full.iter().copied()), None);

        let mut nearly = GREEK_ALPHABET.to_vec();
        nearly.remove(30);
        assert_eq!(smallest_free_slot(nearly.iter().copied()), Some(30));
    }
}
