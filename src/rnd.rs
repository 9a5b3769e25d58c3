use rand_core::{impls, Error, RngCore, SeedableRng};

/// Substituted for an all-zero seed, which would lock the stream at zero.
const SEED_FALLBACK: u64 = 0x9e37_79b9_7f4a_7c15;

/// xorshift128+ pseudo-random stream: 128 bits of state, 64-bit outputs.
///
/// Fast and statistically decent, but NOT cryptographically secure; it only
/// varies packet fields for load realism and must never be used where an
/// adversary benefits from predicting it. The stream performs no internal
/// locking: a shared instance requires external serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xorshift128Plus {
    s: [u64; 2],
}

impl Xorshift128Plus {
    pub fn new(s0: u64, s1: u64) -> Xorshift128Plus {
        let mut rng = Xorshift128Plus { s: [0, 0] };
        rng.reseed(s0, s1);
        rng
    }

    /// Reset the stream. An all-zero seed is replaced by a fixed nonzero
    /// word so the state can never be zero everywhere.
    pub fn reseed(&mut self, s0: u64, s1: u64) {
        if s0 == 0 && s1 == 0 {
            self.s = [SEED_FALLBACK, 0];
        } else {
            self.s = [s0, s1];
        }
    }

    /// Advance the state and return the next 64-bit value.
    ///
    /// The bit manipulation is fixed; recorded output vectors depend on it.
    pub fn next(&mut self) -> u64 {
        let mut s1 = self.s[0];
        let s0 = self.s[1];
        self.s[0] = s0;
        s1 ^= s1 << 23;
        self.s[1] = s1 ^ s0 ^ (s1 >> 17) ^ (s0 >> 26);
        self.s[1].wrapping_add(s0)
    }
}

impl RngCore for Xorshift128Plus {
    fn next_u32(&mut self) -> u32 {
        self.next() as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Xorshift128Plus {
    type Seed = [u8; 16];

    fn from_seed(seed: [u8; 16]) -> Xorshift128Plus {
        let mut w0 = [0u8; 8];
        let mut w1 = [0u8; 8];
        w0.copy_from_slice(&seed[..8]);
        w1.copy_from_slice(&seed[8..]);
        Xorshift128Plus::new(u64::from_le_bytes(w0), u64::from_le_bytes(w1))
    }
}

pub const MAX_RND_BITFIELDS: usize = 32;
pub const MAX_BITFIELD_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BitfieldSpec {
    offset: usize,
    and_mask: u32,
    or_mask: u32,
    rnd_mask: u32,
}

/// Random bitfield overlays applied to outgoing packet bytes.
///
/// Each spec is compiled from a textual template where every character
/// drives one bit: '0' forces it to 0, '1' forces it to 1, 'X' draws it
/// from the random stream and '.' leaves it alone. The template is
/// left-aligned on a 32-bit window starting at the spec's byte offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomBitfields {
    active: u32,
    specs: [BitfieldSpec; MAX_RND_BITFIELDS],
}

impl RandomBitfields {
    pub fn new() -> RandomBitfields {
        RandomBitfields::default()
    }

    /// Number of enabled specs.
    pub fn active_count(&self) -> u32 {
        self.active.count_ones()
    }

    /// Compile and store one bitfield spec. An empty template disables the
    /// slot.
    pub fn set_spec(&mut self, idx: usize, offset: usize, template: &str) -> Result<(), String> {
        if idx >= MAX_RND_BITFIELDS {
            return Err(format!("bitfield index {idx} out of range"));
        }
        if template.is_empty() {
            self.active &= !(1u32 << idx);
            return Ok(());
        }
        if template.len() > MAX_BITFIELD_SIZE {
            return Err(format!(
                "bitfield template longer than {MAX_BITFIELD_SIZE} bits"
            ));
        }

        let mut mask0: u32 = 0;
        let mut mask1: u32 = 0;
        let mut mask_rnd: u32 = 0;
        for c in template.chars() {
            mask0 <<= 1;
            mask1 <<= 1;
            mask_rnd <<= 1;
            match c {
                '0' => mask0 |= 1,
                '1' => mask1 |= 1,
                'X' => mask_rnd |= 1,
                '.' => {}
                other => return Err(format!("unknown char {other:?} in bitfield template")),
            }
        }
        // left-align on the 32-bit window
        let pad = MAX_BITFIELD_SIZE - template.len();
        mask0 <<= pad;
        mask1 <<= pad;
        mask_rnd <<= pad;

        self.specs[idx] = BitfieldSpec {
            offset,
            // random bits are cleared too, so the draw can be merged with OR
            and_mask: !(mask0 | mask_rnd),
            or_mask: mask1,
            rnd_mask: mask_rnd,
        };
        self.active |= 1u32 << idx;
        Ok(())
    }

    /// Apply every active spec to `buf`. Windows that do not fit inside the
    /// buffer are skipped.
    pub fn apply(&self, rng: &mut impl RngCore, buf: &mut [u8]) {
        if self.active == 0 {
            return;
        }
        for (idx, spec) in self.specs.iter().enumerate() {
            if self.active & (1u32 << idx) == 0 {
                continue;
            }
            let Some(window) = spec
                .offset
                .checked_add(4)
                .and_then(|end| buf.get_mut(spec.offset..end))
            else {
                continue;
            };
            let mut word = u32::from_be_bytes([window[0], window[1], window[2], window[3]]);
            word &= spec.and_mask;
            word |= spec.or_mask;
            if spec.rnd_mask != 0 {
                word |= rng.next_u32() & spec.rnd_mask;
            }
            window.copy_from_slice(&word.to_be_bytes());
        }
    }
}
