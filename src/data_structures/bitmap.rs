use crate::unsigned_ceil_div;

/// Piece availability advertised to a peer, most significant bit first.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    data: Vec<u8>,
}

impl Bitmap {
    /// Every piece set. Padding bits of the last byte stay zero.
    pub fn full(n: u32) -> Self {
        let n = n as usize;
        let number_of_bytes_needed = if n == 0 {
            0
        } else {
            unsigned_ceil_div!(n, 8)
        };
        let mut data = vec![0u8; number_of_bytes_needed];

        let whole_bytes = n / 8;
        data[..whole_bytes].fill(0xff);

        let trailing_bits = n % 8;
        if trailing_bits > 0 {
            data[whole_bytes] = !(0xffu8 >> trailing_bits);
        }

        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::Bitmap;

    fn get(bm: &Bitmap, i: usize) -> bool {
        bm.as_bytes()[i / 8] & (0b1000_0000u8 >> (i % 8)) > 0
    }

    #[test]
    fn full_three_pieces() {
        let bm = Bitmap::full(3);

        assert_eq!(&[0b1110_0000], bm.as_bytes());
    }

    #[test]
    fn full_byte_aligned() {
        let bm = Bitmap::full(16);

        assert_eq!(&[0xff, 0xff], bm.as_bytes());
    }

    #[test]
    fn full_empty() {
        assert!(Bitmap::full(0).as_bytes().is_empty());
    }

    #[test]
    fn full_has_every_piece_and_zero_padding() {
        for n in 1..=70u32 {
            let bm = Bitmap::full(n);
            let weight: u32 = bm.as_bytes().iter().map(|byte| byte.count_ones()).sum();

            assert_eq!(n, weight);
            assert_eq!((n as usize + 7) / 8, bm.as_bytes().len());
            assert!((0..n as usize).all(|i| get(&bm, i)));

            let padding = bm.as_bytes().len() * 8 - n as usize;
            let last = *bm.as_bytes().last().unwrap();
            assert_eq!(0, last & ((1u16 << padding) - 1) as u8, "n={n}");
        }
    }
}
