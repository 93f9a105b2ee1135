//! Protection Coverage
//!
//! Decides which media packets of a batch each repair packet protects.
//! Coverage is interleaved: with `R` repair packets, the media packet at
//! batch index `i` is protected by repair packet `i % R`. A burst of up to
//! `R` consecutive losses therefore hits each repair packet at most once.

/// Largest batch any supported scheme can describe in one mask
pub const MAX_MEDIA_PACKETS: usize = 110;

/// Coverage map from repair packets to batch indices
///
/// Row `r` is a bitmap over batch indices (bit `i` set means repair packet
/// `r` protects media packet `i`). The map is rebuilt only when the batch
/// size or repair count changes.
#[derive(Debug, Clone, Default)]
pub struct ProtectionCoverage {
    rows: Vec<u128>,
    num_media: usize,
}

impl ProtectionCoverage {
    /// Create an empty coverage map
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure the map describes `num_media` media packets and `num_fec` repair packets
    ///
    /// Returns true if the map had to be rebuilt.
    pub fn update(&mut self, num_media: usize, num_fec: usize) -> bool {
        debug_assert!(num_media <= MAX_MEDIA_PACKETS);
        if num_media == self.num_media && num_fec == self.rows.len() {
            return false;
        }

        self.num_media = num_media;
        self.rows.clear();
        self.rows.resize(num_fec, 0);

        for (fec_index, row) in self.rows.iter_mut().enumerate() {
            let mut media_index = fec_index;
            while media_index < num_media {
                *row |= 1u128 << media_index;
                media_index += num_fec;
            }
        }
        true
    }

    /// Number of repair packets described
    pub fn num_fec(&self) -> usize {
        self.rows.len()
    }

    /// Number of media packets described
    pub fn num_media(&self) -> usize {
        self.num_media
    }

    /// Batch indices protected by repair packet `fec_index`, ascending
    pub fn covered_by(&self, fec_index: usize) -> impl Iterator<Item = usize> + '_ {
        let row = self.rows.get(fec_index).copied().unwrap_or(0);
        (0..self.num_media).filter(move |i| row & (1u128 << i) != 0)
    }
}
