//! QR Code Model 2 symbol encoding.
//!
//! Turns text into a grid of dark and light modules: segment selection (numeric,
//! alphanumeric, byte), Reed-Solomon error correction, module placement and mask
//! selection. Nothing here knows about pixels or styling; [`crate::matrix`] adapts the
//! result into a [`SymbolMatrix`](crate::matrix::SymbolMatrix).

use core::convert::TryFrom;

use thiserror::Error;

/// A QR Code symbol: a square grid of dark and light modules.
///
/// Instances are immutable once [`QrCode::encode_text`] or [`QrCode::encode_codewords`]
/// returns.
///
/// ```rust
/// use qistyle::qrcode::{QrCode, QrCodeEcc, Version};
///
/// let qr = QrCode::encode_text("Hello, World!", QrCodeEcc::Low, Version::MIN, Version::MAX, None, false)
///     .unwrap();
/// assert_eq!(qr.size(), 21);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct QrCode {
    /// Edge length in modules, between 21 and 177. Equal to `version * 4 + 17`.
    size: u8,

    /// Modules packed bitwise (0 = light, 1 = dark), row-major.
    modules: Vec<u8>,
}

impl QrCode {
    /// Encodes `text` using the smallest version in `minversion..=maxversion` that fits.
    ///
    /// With `boostecl` the error correction level is raised as long as that does not
    /// require a larger version. `mask: None` picks the mask with the lowest penalty.
    pub fn encode_text(
        text: &str,
        ecl: QrCodeEcc,
        minversion: Version,
        maxversion: Version,
        mask: Option<Mask>,
        boostecl: bool,
    ) -> Result<Self, DataTooLong> {
        let segs: Vec<QrSegment> = if text.is_empty() {
            Vec::new()
        } else if QrSegment::is_numeric(text) {
            vec![QrSegment::make_numeric(text)]
        } else if QrSegment::is_alphanumeric(text) {
            vec![QrSegment::make_alphanumeric(text)]
        } else {
            vec![QrSegment::make_bytes(text.as_bytes())]
        };
        let (codewords, ecl, version) =
            Self::encode_segments_to_codewords(&segs, ecl, minversion, maxversion, boostecl)?;
        Ok(Self::encode_codewords(&codewords, ecl, version, mask))
    }

    /// Packs `segs` into data codewords for the smallest fitting version.
    ///
    /// Returns the padded data codewords together with the (possibly boosted) error
    /// correction level and the chosen version.
    pub fn encode_segments_to_codewords(
        segs: &[QrSegment],
        mut ecl: QrCodeEcc,
        minversion: Version,
        maxversion: Version,
        boostecl: bool,
    ) -> Result<(Vec<u8>, QrCodeEcc, Version), DataTooLong> {
        assert!(minversion <= maxversion, "Invalid version range");

        let mut version = minversion;
        let used_bits = loop {
            let capacity_bits = Self::num_data_codewords(version, ecl) * 8;
            match QrSegment::total_bits(segs, version) {
                Some(n) if n <= capacity_bits => break n,
                used if version >= maxversion => {
                    return Err(match used {
                        None => DataTooLong::SegmentTooLong,
                        Some(n) => DataTooLong::DataOverCapacity(n, capacity_bits),
                    });
                }
                _ => version = Version::new(version.value() + 1),
            }
        };

        for &boosted in &[QrCodeEcc::Medium, QrCodeEcc::Quartile, QrCodeEcc::High] {
            if boostecl && used_bits <= Self::num_data_codewords(version, boosted) * 8 {
                ecl = boosted;
            }
        }

        let capacity_bits = Self::num_data_codewords(version, ecl) * 8;
        let mut bb = BitBuffer::with_capacity(capacity_bits / 8);
        for seg in segs {
            bb.append_bits(seg.mode.mode_bits(), 4);
            bb.append_bits(
                u32::try_from(seg.numchars).map_err(|_| DataTooLong::SegmentTooLong)?,
                seg.mode.num_char_count_bits(version),
            );
            for i in 0..seg.bitlength {
                let bit = (seg.data[i >> 3] >> (7 - (i & 7))) & 1;
                bb.append_bits(bit.into(), 1);
            }
        }
        debug_assert_eq!(bb.len(), used_bits);

        // Terminator, then pad to a byte boundary
        let terminator = core::cmp::min(4, capacity_bits - bb.len());
        bb.append_bits(0, terminator as u8);
        let align = bb.len().wrapping_neg() & 7;
        bb.append_bits(0, align as u8);
        debug_assert_eq!(bb.len() % 8, 0);

        for &pad in [0xec, 0x11].iter().cycle() {
            if bb.len() >= capacity_bits {
                break;
            }
            bb.append_bits(pad, 8);
        }
        Ok((bb.into_bytes(), ecl, version))
    }

    /// Builds the symbol for already-packed data codewords.
    ///
    /// Adds error correction, draws function patterns and data, then applies `mask` (or
    /// the lowest-penalty mask when `None`).
    pub fn encode_codewords(
        datacodewords: &[u8],
        ecl: QrCodeEcc,
        version: Version,
        mask: Option<Mask>,
    ) -> Self {
        assert_eq!(datacodewords.len(), Self::num_data_codewords(version, ecl));
        let allcodewords = Self::add_ecc_and_interleave(datacodewords, version, ecl);

        let mut result = Self::function_modules_marked(version);
        result.draw_codewords(&allcodewords);
        result.draw_light_function_modules();
        let funcmods = Self::function_modules_marked(version);

        let mask = mask.unwrap_or_else(|| {
            let mut best = Mask::new(0);
            let mut minpenalty = i32::MAX;
            for i in 0u8..8 {
                let candidate = Mask::new(i);
                result.apply_mask(&funcmods, candidate);
                result.draw_format_bits(ecl, candidate);
                let penalty = result.penalty_score();
                if penalty < minpenalty {
                    best = candidate;
                    minpenalty = penalty;
                }
                // XOR, so applying again undoes it
                result.apply_mask(&funcmods, candidate);
            }
            best
        });
        result.apply_mask(&funcmods, mask);
        result.draw_format_bits(ecl, mask);
        result
    }

    /// This symbol's version, in the range [1, 40].
    pub fn version(&self) -> Version {
        Version::new((self.size - 17) / 4)
    }

    /// Edge length in modules, in the range [21, 177].
    pub fn size(&self) -> i32 {
        i32::from(self.size)
    }

    /// The error correction level recorded in the format bits.
    pub fn error_correction_level(&self) -> QrCodeEcc {
        // Format bits are stored XORed with 0x5412
        let index = (usize::from(self.module_bounded(0, 8) ^ true) << 1) | usize::from(self.module_bounded(1, 8));
        use QrCodeEcc::*;
        [Medium, Low, High, Quartile][index]
    }

    /// The mask recorded in the format bits.
    pub fn mask(&self) -> Mask {
        let bits = (u8::from(self.module_bounded(2, 8)) << 2)
            | (u8::from(self.module_bounded(3, 8)) << 1)
            | u8::from(self.module_bounded(4, 8));
        Mask::new(bits ^ 0b101)
    }

    /// `true` for a dark module. Coordinates outside the symbol are light.
    pub fn get_module(&self, x: i32, y: i32) -> bool {
        let range = 0..self.size();
        range.contains(&x) && range.contains(&y) && self.module_bounded(x as u8, y as u8)
    }

    fn blank(version: Version) -> Self {
        let size = version.value() * 4 + 17;
        let cells = usize::from(size) * usize::from(size);
        Self {
            size,
            modules: vec![0u8; (cells + 7) / 8],
        }
    }

    fn module_bounded(&self, x: u8, y: u8) -> bool {
        debug_assert!(x < self.size && y < self.size);
        let index = usize::from(y) * usize::from(self.size) + usize::from(x);
        get_bit(self.modules[index >> 3].into(), (index & 7) as u8)
    }

    fn set_module_unbounded(&mut self, x: i32, y: i32, isdark: bool) {
        let range = 0..self.size();
        if range.contains(&x) && range.contains(&y) {
            self.set_module_bounded(x as u8, y as u8, isdark);
        }
    }

    fn set_module_bounded(&mut self, x: u8, y: u8, isdark: bool) {
        debug_assert!(x < self.size && y < self.size);
        let index = usize::from(y) * usize::from(self.size) + usize::from(x);
        let bit = 1u8 << (index & 7);
        if isdark {
            self.modules[index >> 3] |= bit;
        } else {
            self.modules[index >> 3] &= !bit;
        }
    }

    fn add_ecc_and_interleave(data: &[u8], ver: Version, ecl: QrCodeEcc) -> Vec<u8> {
        let numblocks = Self::table_get(&NUM_ERROR_CORRECTION_BLOCKS, ver, ecl);
        let blockecclen = Self::table_get(&ECC_CODEWORDS_PER_BLOCK, ver, ecl);
        let rawcodewords = Self::num_raw_data_modules(ver) / 8;
        let numshortblocks = numblocks - (rawcodewords % numblocks);
        let shortblocklen = rawcodewords / numblocks - blockecclen;

        let mut result = vec![0u8; rawcodewords];
        let rs = ReedSolomonGenerator::new(blockecclen);
        let mut ecc = vec![0u8; blockecclen];
        let mut rest = data;
        for i in 0..numblocks {
            let blocklen = shortblocklen + usize::from(i >= numshortblocks);
            let (block, tail) = rest.split_at(blocklen);
            rs.compute_remainder(block, &mut ecc);

            let mut k = i;
            for (j, &b) in block.iter().enumerate() {
                // Long blocks carry one extra byte that lands after every short block's data
                if j == shortblocklen {
                    k -= numshortblocks;
                }
                result[k] = b;
                k += numblocks;
            }
            let mut k = data.len() + i;
            for &b in &ecc {
                result[k] = b;
                k += numblocks;
            }
            rest = tail;
        }
        debug_assert!(rest.is_empty());
        result
    }

    fn function_modules_marked(ver: Version) -> Self {
        let mut result = Self::blank(ver);
        let size = result.size;

        // Timing patterns, finders with separators and format areas
        result.fill_rectangle(6, 0, 1, size);
        result.fill_rectangle(0, 6, size, 1);
        result.fill_rectangle(0, 0, 9, 9);
        result.fill_rectangle(size - 8, 0, 8, 9);
        result.fill_rectangle(0, size - 8, 9, 8);

        let positions = result.alignment_pattern_positions();
        let last = positions.len().saturating_sub(1);
        for (i, &p0) in positions.iter().enumerate() {
            for (j, &p1) in positions.iter().enumerate() {
                let overlaps_finder = (i == 0 && j == 0) || (i == 0 && j == last) || (i == last && j == 0);
                if !overlaps_finder {
                    result.fill_rectangle(p0 - 2, p1 - 2, 5, 5);
                }
            }
        }

        if ver.value() >= 7 {
            result.fill_rectangle(size - 11, 0, 3, 6);
            result.fill_rectangle(0, size - 11, 6, 3);
        }
        result
    }

    fn draw_light_function_modules(&mut self) {
        let size = self.size;
        for i in (7..size - 7).step_by(2) {
            self.set_module_bounded(6, i, false);
            self.set_module_bounded(i, 6, false);
        }

        for dy in -4i32..=4 {
            for dx in -4i32..=4 {
                let dist = dx.abs().max(dy.abs());
                if dist == 2 || dist == 4 {
                    self.set_module_unbounded(3 + dx, 3 + dy, false);
                    self.set_module_unbounded(i32::from(size) - 4 + dx, 3 + dy, false);
                    self.set_module_unbounded(3 + dx, i32::from(size) - 4 + dy, false);
                }
            }
        }

        let positions = self.alignment_pattern_positions();
        let last = positions.len().saturating_sub(1);
        for (i, &p0) in positions.iter().enumerate() {
            for (j, &p1) in positions.iter().enumerate() {
                if (i == 0 && j == 0) || (i == 0 && j == last) || (i == last && j == 0) {
                    continue;
                }
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        self.set_module_bounded(
                            (i32::from(p0) + dx) as u8,
                            (i32::from(p1) + dy) as u8,
                            dx == 0 && dy == 0,
                        );
                    }
                }
            }
        }

        let ver = u32::from(self.version().value());
        if ver >= 7 {
            let mut rem = ver;
            for _ in 0..12 {
                rem = (rem << 1) ^ ((rem >> 11) * 0x1f25);
            }
            let bits = (ver << 12) | rem;
            for i in 0u8..18 {
                let bit = get_bit(bits, i);
                let a = size - 11 + (i % 3);
                let b = i / 3;
                self.set_module_bounded(a, b, bit);
                self.set_module_bounded(b, a, bit);
            }
        }
    }

    fn draw_format_bits(&mut self, ecl: QrCodeEcc, mask: Mask) {
        let data = u32::from((ecl.format_bits() << 3) | mask.value());
        let mut rem = data;
        for _ in 0..10 {
            rem = (rem << 1) ^ ((rem >> 9) * 0x537);
        }
        let bits = ((data << 10) | rem) ^ 0x5412;

        // First copy, around the top-left finder
        for i in 0..6 {
            self.set_module_bounded(8, i, get_bit(bits, i));
        }
        self.set_module_bounded(8, 7, get_bit(bits, 6));
        self.set_module_bounded(8, 8, get_bit(bits, 7));
        self.set_module_bounded(7, 8, get_bit(bits, 8));
        for i in 9..15 {
            self.set_module_bounded(14 - i, 8, get_bit(bits, i));
        }

        // Second copy, split between the other two finders
        let size = self.size;
        for i in 0..8 {
            self.set_module_bounded(size - 1 - i, 8, get_bit(bits, i));
        }
        for i in 8..15 {
            self.set_module_bounded(8, size - 15 + i, get_bit(bits, i));
        }
        self.set_module_bounded(8, size - 8, true);
    }

    fn fill_rectangle(&mut self, left: u8, top: u8, width: u8, height: u8) {
        for dy in 0..height {
            for dx in 0..width {
                self.set_module_bounded(left + dx, top + dy, true);
            }
        }
    }

    fn draw_codewords(&mut self, data: &[u8]) {
        debug_assert_eq!(data.len(), Self::num_raw_data_modules(self.version()) / 8);
        let size = self.size();
        let total_bits = data.len() * 8;
        let mut i = 0usize;
        let mut right = size - 1;
        // Zigzag over column pairs, skipping the vertical timing column
        while right >= 1 {
            if right == 6 {
                right = 5;
            }
            for vert in 0..size {
                for j in 0..2 {
                    let x = (right - j) as u8;
                    let upward = ((right + 1) & 2) == 0;
                    let y = (if upward { size - 1 - vert } else { vert }) as u8;
                    if !self.module_bounded(x, y) && i < total_bits {
                        self.set_module_bounded(x, y, get_bit(data[i >> 3].into(), 7 - ((i as u8) & 7)));
                        i += 1;
                    }
                }
            }
            right -= 2;
        }
        debug_assert_eq!(i, total_bits);
    }

    fn apply_mask(&mut self, functionmodules: &QrCode, mask: Mask) {
        for y in 0..self.size {
            for x in 0..self.size {
                if functionmodules.module_bounded(x, y) {
                    continue;
                }
                let (xi, yi) = (i32::from(x), i32::from(y));
                let invert = match mask.value() {
                    0 => (xi + yi) % 2 == 0,
                    1 => yi % 2 == 0,
                    2 => xi % 3 == 0,
                    3 => (xi + yi) % 3 == 0,
                    4 => (xi / 3 + yi / 2) % 2 == 0,
                    5 => (xi * yi) % 2 + (xi * yi) % 3 == 0,
                    6 => ((xi * yi) % 2 + (xi * yi) % 3) % 2 == 0,
                    7 => ((xi + yi) % 2 + (xi * yi) % 3) % 2 == 0,
                    _ => unreachable!(),
                };
                let current = self.module_bounded(x, y);
                self.set_module_bounded(x, y, current ^ invert);
            }
        }
    }

    fn penalty_score(&self) -> i32 {
        let size = self.size;
        let mut result = self.line_penalty(|a, b| (a, b)) + self.line_penalty(|a, b| (b, a));

        for y in 0..size - 1 {
            for x in 0..size - 1 {
                let color = self.module_bounded(x, y);
                if color == self.module_bounded(x + 1, y)
                    && color == self.module_bounded(x, y + 1)
                    && color == self.module_bounded(x + 1, y + 1)
                {
                    result += PENALTY_N2;
                }
            }
        }

        let dark = self.modules.iter().map(|b| b.count_ones()).sum::<u32>() as i32;
        let total = i32::from(size) * i32::from(size);
        let k = ((dark * 20 - total * 10).abs() + total - 1) / total - 1;
        result + k * PENALTY_N4
    }

    /// Run-length and finder-like penalties along every row (or column, via `coords`).
    fn line_penalty(&self, coords: impl Fn(u8, u8) -> (u8, u8)) -> i32 {
        let size = self.size;
        let mut result = 0;
        for line in 0..size {
            let mut runcolor = false;
            let mut runlen: i32 = 0;
            let mut history = FinderPenalty::new(size);
            for pos in 0..size {
                let (x, y) = coords(pos, line);
                let color = self.module_bounded(x, y);
                if color == runcolor {
                    runlen += 1;
                    if runlen == 5 {
                        result += PENALTY_N1;
                    } else if runlen > 5 {
                        result += 1;
                    }
                } else {
                    history.add_history(runlen);
                    if !runcolor {
                        result += history.count_patterns() * PENALTY_N3;
                    }
                    runcolor = color;
                    runlen = 1;
                }
            }
            result += history.terminate_and_count(runcolor, runlen) * PENALTY_N3;
        }
        result
    }

    fn alignment_pattern_positions(&self) -> Vec<u8> {
        let ver = self.version().value();
        if ver == 1 {
            return Vec::new();
        }
        let numalign = ver / 7 + 2;
        let step = if ver == 32 {
            26
        } else {
            ((ver * 4 + numalign * 2 + 1) / (numalign * 2 - 2)) * 2
        };
        let mut result: Vec<u8> = (0..numalign - 1).map(|i| self.size - 7 - i * step).collect();
        result.push(6);
        result.reverse();
        result
    }

    fn num_raw_data_modules(ver: Version) -> usize {
        let ver = usize::from(ver.value());
        let mut result = (16 * ver + 128) * ver + 64;
        if ver >= 2 {
            let numalign = ver / 7 + 2;
            result -= (25 * numalign - 10) * numalign - 55;
            if ver >= 7 {
                result -= 36;
            }
        }
        result
    }

    fn num_data_codewords(ver: Version, ecl: QrCodeEcc) -> usize {
        Self::num_raw_data_modules(ver) / 8
            - Self::table_get(&ECC_CODEWORDS_PER_BLOCK, ver, ecl)
                * Self::table_get(&NUM_ERROR_CORRECTION_BLOCKS, ver, ecl)
    }

    fn table_get(table: &'static [[i8; 41]; 4], ver: Version, ecl: QrCodeEcc) -> usize {
        table[ecl.ordinal()][usize::from(ver.value())] as usize
    }
}

impl core::fmt::Debug for QrCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QrCode")
            .field("version", &self.version().value())
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

struct ReedSolomonGenerator {
    divisor: [u8; 30],
    degree: usize,
}

impl ReedSolomonGenerator {
    fn new(degree: usize) -> Self {
        assert!((1..=30).contains(&degree), "Degree out of range");
        let mut divisor = [0u8; 30];
        divisor[degree - 1] = 1;
        // Product of (x - r^i) for i in 0..degree, r = 0x02
        let mut root: u8 = 1;
        for _ in 0..degree {
            for j in 0..degree {
                divisor[j] = Self::multiply(divisor[j], root);
                if j + 1 < degree {
                    divisor[j] ^= divisor[j + 1];
                }
            }
            root = Self::multiply(root, 0x02);
        }
        Self { divisor, degree }
    }

    fn compute_remainder(&self, data: &[u8], result: &mut [u8]) {
        assert_eq!(result.len(), self.degree);
        result.fill(0);
        for &b in data {
            let factor = b ^ result[0];
            result.copy_within(1.., 0);
            result[self.degree - 1] = 0;
            for (x, &y) in result.iter_mut().zip(self.divisor.iter()) {
                *x ^= Self::multiply(y, factor);
            }
        }
    }

    /// Multiplication in GF(2^8) modulo x^8 + x^4 + x^3 + x^2 + 1.
    fn multiply(x: u8, y: u8) -> u8 {
        let mut z: u8 = 0;
        for i in (0..8).rev() {
            z = (z << 1) ^ ((z >> 7) * 0x1d);
            z ^= ((y >> i) & 1) * x;
        }
        z
    }
}

struct FinderPenalty {
    qr_size: i32,
    run_history: [i32; 7],
}

impl FinderPenalty {
    fn new(size: u8) -> Self {
        Self {
            qr_size: i32::from(size),
            run_history: [0; 7],
        }
    }

    fn add_history(&mut self, mut runlen: i32) {
        if self.run_history[0] == 0 {
            // Light border before the first run
            runlen += self.qr_size;
        }
        self.run_history.copy_within(0..6, 1);
        self.run_history[0] = runlen;
    }

    fn count_patterns(&self) -> i32 {
        let rh = &self.run_history;
        let n = rh[1];
        let core = n > 0 && rh[2] == n && rh[3] == n * 3 && rh[4] == n && rh[5] == n;
        i32::from(core && rh[0] >= n * 4 && rh[6] >= n) + i32::from(core && rh[6] >= n * 4 && rh[0] >= n)
    }

    fn terminate_and_count(mut self, runcolor: bool, mut runlen: i32) -> i32 {
        if runcolor {
            self.add_history(runlen);
            runlen = 0;
        }
        runlen += self.qr_size;
        self.add_history(runlen);
        self.count_patterns()
    }
}

const PENALTY_N1: i32 = 3;
const PENALTY_N2: i32 = 3;
const PENALTY_N3: i32 = 40;
const PENALTY_N4: i32 = 10;

static ECC_CODEWORDS_PER_BLOCK: [[i8; 41]; 4] = [
    [
        -1, 7, 10, 15, 20, 26, 18, 20, 24, 30, 18, 20, 24, 26, 30, 22, 24, 28, 30, 28, 28, 28, 28, 30,
        30, 26, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // Low
    [
        -1, 10, 16, 26, 18, 24, 16, 18, 22, 22, 26, 30, 22, 22, 24, 24, 28, 28, 26, 26, 26, 26, 28, 28,
        28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    ], // Medium
    [
        -1, 13, 22, 18, 26, 18, 24, 18, 22, 20, 24, 28, 26, 24, 20, 30, 24, 28, 28, 26, 30, 28, 30, 30,
        30, 30, 28, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // Quartile
    [
        -1, 17, 28, 22, 16, 22, 28, 26, 26, 24, 28, 24, 28, 22, 24, 24, 30, 28, 28, 26, 28, 30, 24, 30,
        30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30, 30,
    ], // High
];

static NUM_ERROR_CORRECTION_BLOCKS: [[i8; 41]; 4] = [
    [
        -1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 4, 4, 4, 6, 6, 6, 6, 7, 8, 8, 9, 9, 10, 12, 12, 12,
        13, 14, 15, 16, 17, 18, 19, 19, 20, 21, 22, 24, 25,
    ], // Low
    [
        -1, 1, 1, 1, 2, 2, 4, 4, 4, 5, 5, 5, 8, 9, 9, 10, 10, 11, 13, 14, 16, 17, 17, 18, 20, 21,
        23, 25, 26, 28, 29, 31, 33, 35, 37, 38, 40, 43, 45, 47, 49,
    ], // Medium
    [
        -1, 1, 1, 2, 2, 4, 4, 6, 6, 8, 8, 8, 10, 12, 16, 12, 17, 16, 18, 21, 20, 23, 23, 25, 27, 29,
        34, 34, 35, 38, 40, 43, 45, 48, 51, 53, 56, 59, 62, 65, 68,
    ], // Quartile
    [
        -1, 1, 1, 2, 4, 4, 4, 5, 6, 8, 8, 11, 11, 16, 16, 18, 16, 19, 21, 25, 25, 25, 34, 30, 32, 35,
        37, 40, 42, 45, 48, 51, 54, 57, 60, 63, 66, 70, 74, 77, 81,
    ], // High
];

/// Error correction level of a symbol.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum QrCodeEcc {
    /// Tolerates ~7% erroneous codewords.
    Low,
    /// Tolerates ~15% erroneous codewords.
    Medium,
    /// Tolerates ~25% erroneous codewords.
    Quartile,
    /// Tolerates ~30% erroneous codewords.
    High,
}

impl QrCodeEcc {
    fn ordinal(self) -> usize {
        use QrCodeEcc::*;
        match self {
            Low => 0,
            Medium => 1,
            Quartile => 2,
            High => 3,
        }
    }

    fn format_bits(self) -> u8 {
        use QrCodeEcc::*;
        match self {
            Low => 1,
            Medium => 0,
            Quartile => 3,
            High => 2,
        }
    }
}

/// A run of data encoded in a single mode.
pub struct QrSegment {
    mode: QrSegmentMode,
    numchars: usize,
    data: Vec<u8>,
    bitlength: usize,
}

impl QrSegment {
    /// Byte mode segment for arbitrary binary data.
    pub fn make_bytes(data: &[u8]) -> Self {
        Self {
            mode: QrSegmentMode::Byte,
            numchars: data.len(),
            data: data.to_vec(),
            bitlength: data.len() * 8,
        }
    }

    /// Numeric mode segment. `text` must satisfy [`QrSegment::is_numeric`].
    pub fn make_numeric(text: &str) -> Self {
        debug_assert!(Self::is_numeric(text));
        let mut bb = BitBuffer::with_capacity(text.len() / 2 + 1);
        for chunk in text.as_bytes().chunks(3) {
            let value = chunk.iter().fold(0u32, |acc, &b| acc * 10 + u32::from(b - b'0'));
            bb.append_bits(value, chunk.len() as u8 * 3 + 1);
        }
        Self::from_bits(QrSegmentMode::Numeric, text.len(), bb)
    }

    /// Alphanumeric mode segment. `text` must satisfy [`QrSegment::is_alphanumeric`].
    pub fn make_alphanumeric(text: &str) -> Self {
        debug_assert!(Self::is_alphanumeric(text));
        let mut bb = BitBuffer::with_capacity(text.len() * 11 / 16 + 1);
        let indices: Vec<u32> = text
            .chars()
            .filter_map(|c| ALPHANUMERIC_CHARSET.find(c))
            .map(|i| i as u32)
            .collect();
        for pair in indices.chunks(2) {
            match *pair {
                [a, b] => bb.append_bits(a * 45 + b, 11),
                [a] => bb.append_bits(a, 6),
                _ => unreachable!(),
            }
        }
        Self::from_bits(QrSegmentMode::Alphanumeric, text.len(), bb)
    }

    fn from_bits(mode: QrSegmentMode, numchars: usize, bb: BitBuffer) -> Self {
        let bitlength = bb.len();
        Self {
            mode,
            numchars,
            data: bb.into_bytes(),
            bitlength,
        }
    }

    pub fn mode(&self) -> QrSegmentMode {
        self.mode
    }

    pub fn num_chars(&self) -> usize {
        self.numchars
    }

    fn total_bits(segs: &[Self], version: Version) -> Option<usize> {
        let mut result: usize = 0;
        for seg in segs {
            let ccbits = seg.mode.num_char_count_bits(version);
            if seg.numchars >= 1usize << ccbits {
                return None;
            }
            result = result.checked_add(4 + usize::from(ccbits))?;
            result = result.checked_add(seg.bitlength)?;
        }
        Some(result)
    }

    pub fn is_numeric(text: &str) -> bool {
        text.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn is_alphanumeric(text: &str) -> bool {
        text.chars().all(|c| ALPHANUMERIC_CHARSET.contains(c))
    }
}

static ALPHANUMERIC_CHARSET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ $%*+-./:";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum QrSegmentMode {
    Numeric,
    Alphanumeric,
    Byte,
}

impl QrSegmentMode {
    fn mode_bits(self) -> u32 {
        use QrSegmentMode::*;
        match self {
            Numeric => 0x1,
            Alphanumeric => 0x2,
            Byte => 0x4,
        }
    }

    fn num_char_count_bits(self, ver: Version) -> u8 {
        use QrSegmentMode::*;
        let widths = match self {
            Numeric => [10, 12, 14],
            Alphanumeric => [9, 11, 13],
            Byte => [8, 16, 16],
        };
        widths[usize::from((ver.value() + 7) / 17)]
    }
}

/// Append-only big-endian bit sequence.
struct BitBuffer {
    data: Vec<u8>,
    length: usize,
}

impl BitBuffer {
    fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            length: 0,
        }
    }

    fn len(&self) -> usize {
        self.length
    }

    fn append_bits(&mut self, val: u32, len: u8) {
        debug_assert!(len <= 31 && (val >> len) == 0);
        for i in (0..len).rev() {
            if self.length % 8 == 0 {
                self.data.push(0);
            }
            let bit = ((val >> i) & 1) as u8;
            let shift = 7 - (self.length & 7) as u8;
            if let Some(last) = self.data.last_mut() {
                *last |= bit << shift;
            }
            self.length += 1;
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// The data does not fit in any allowed version at the requested error correction level.
///
/// Callers can lower the error correction level or shorten the data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataTooLong {
    #[error("Segment too long")]
    SegmentTooLong,
    #[error("Data length = {0} bits, Max capacity = {1} bits")]
    DataOverCapacity(usize, usize),
}

/// A symbol version (1-40).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Version(u8);

impl Version {
    pub const MIN: Version = Version(1);
    pub const MAX: Version = Version(40);

    /// # Panics
    ///
    /// Panics if `ver` is outside [1, 40].
    pub const fn new(ver: u8) -> Self {
        assert!(Version::MIN.value() <= ver && ver <= Version::MAX.value(), "Version number out of range");
        Self(ver)
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

/// A mask pattern (0-7).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Mask(u8);

impl Mask {
    /// # Panics
    ///
    /// Panics if `mask` is greater than 7.
    pub const fn new(mask: u8) -> Self {
        assert!(mask <= 7, "Mask value out of range");
        Self(mask)
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

fn get_bit(x: u32, i: u8) -> bool {
    ((x >> i) & 1) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric() {
        assert!(QrSegment::is_numeric("1234567890"));
        assert!(!QrSegment::is_numeric("1234abc"));
    }

    #[test]
    fn test_is_alphanumeric() {
        assert!(QrSegment::is_alphanumeric("HELLO WORLD"));
        assert!(!QrSegment::is_alphanumeric("Hello World"));
    }

    #[test]
    fn test_numeric_segment_bits() {
        // 3 digits -> 10 bits, 2 digits -> 7 bits
        let seg = QrSegment::make_numeric("12345");
        assert_eq!(seg.bitlength, 17);
        assert_eq!(seg.mode(), QrSegmentMode::Numeric);
    }

    #[test]
    fn test_alphanumeric_segment_bits() {
        let seg = QrSegment::make_alphanumeric("AC-42");
        assert_eq!(seg.bitlength, 11 + 11 + 6);
        assert_eq!(seg.num_chars(), 5);
    }

    #[test]
    fn test_hello_world_is_version_one() {
        let qr = QrCode::encode_text("Hello, world!", QrCodeEcc::Low, Version::MIN, Version::MAX, None, false)
            .unwrap();
        assert_eq!(qr.version(), Version::new(1));
        assert_eq!(qr.size(), 21);
        assert_eq!(qr.error_correction_level(), QrCodeEcc::Low);
    }

    #[test]
    fn test_finder_pattern_corners() {
        let qr = QrCode::encode_text("https://example.com", QrCodeEcc::Medium, Version::MIN, Version::MAX, None, false)
            .unwrap();
        let last = qr.size() - 1;
        // Outer ring of each finder is dark, separator ring is light
        assert!(qr.get_module(0, 0));
        assert!(qr.get_module(last, 0));
        assert!(qr.get_module(0, last));
        assert!(!qr.get_module(7, 7));
        assert!(qr.get_module(3, 3));
        assert!(!qr.get_module(-1, 0));
    }

    #[test]
    fn test_explicit_mask_is_recorded() {
        let qr = QrCode::encode_text("MASK", QrCodeEcc::Quartile, Version::MIN, Version::MAX, Some(Mask::new(5)), false)
            .unwrap();
        assert_eq!(qr.mask(), Mask::new(5));
        assert_eq!(qr.error_correction_level(), QrCodeEcc::Quartile);
    }

    #[test]
    fn test_boost_raises_level_within_version() {
        let qr = QrCode::encode_text("1", QrCodeEcc::Low, Version::MIN, Version::MAX, None, true).unwrap();
        assert_eq!(qr.error_correction_level(), QrCodeEcc::High);
        assert_eq!(qr.version(), Version::new(1));
    }

    #[test]
    fn test_over_capacity() {
        let text = "x".repeat(3000);
        let err = QrCode::encode_text(&text, QrCodeEcc::High, Version::MIN, Version::MAX, None, false).unwrap_err();
        assert!(matches!(err, DataTooLong::DataOverCapacity(_, _)));
    }

    #[test]
    fn test_larger_versions_grow() {
        let text = "a".repeat(200);
        let qr = QrCode::encode_text(&text, QrCodeEcc::Medium, Version::MIN, Version::MAX, None, false).unwrap();
        assert!(qr.version().value() >= 7);
        assert_eq!(qr.size(), i32::from(qr.version().value()) * 4 + 17);
    }
}
