/// 字母表大小：{0:$, 1:A, 2:C, 3:G, 4:T, 5:N}
pub const SIGMA: usize = 6;
/// 参考文本末尾的哨兵编码
pub const SENTINEL: u8 = 0;
/// 未知碱基编码
pub const CODE_N: u8 = 5;

#[inline]
pub fn to_alphabet(b: u8) -> u8 {
    match b.to_ascii_uppercase() {
        b'A' => 1,
        b'C' => 2,
        b'G' => 3,
        b'T' | b'U' => 4,
        _ => CODE_N, // IUPAC 及其它字符一律视为 N
    }
}

#[inline]
pub fn from_alphabet(a: u8) -> u8 {
    match a {
        0 => b'$',
        1 => b'A',
        2 => b'C',
        3 => b'G',
        4 => b'T',
        _ => b'N',
    }
}

/// 将 ASCII 序列编码为字母表序列（不含哨兵）
pub fn encode(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&b| to_alphabet(b)).collect()
}

pub fn decode(codes: &[u8]) -> Vec<u8> {
    codes.iter().map(|&a| from_alphabet(a)).collect()
}

/// 编码后碱基的互补：A<->T, C<->G，N 与 $ 保持不变
#[inline]
pub fn complement_code(a: u8) -> u8 {
    match a {
        1 => 4,
        2 => 3,
        3 => 2,
        4 => 1,
        other => other,
    }
}

/// 编码序列的反向互补
pub fn revcomp_codes(codes: &[u8]) -> Vec<u8> {
    codes.iter().rev().map(|&a| complement_code(a)).collect()
}

#[inline]
pub fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' | b'U' => b'A',
        _ => b'N',
    }
}

/// ASCII 序列的反向互补（SAM 输出反向链 read 时使用）
pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_maps_iupac_to_n() {
        assert_eq!(encode(b"acgtRYN"), vec![1, 2, 3, 4, 5, 5, 5]);
        assert_eq!(decode(&[1, 2, 3, 4, 5]), b"ACGTN");
    }

    #[test]
    fn revcomp_codes_is_involution() {
        let codes = encode(b"AACGTNGT");
        assert_eq!(revcomp_codes(&codes), encode(b"ACNACGTT"));
        assert_eq!(revcomp_codes(&revcomp_codes(&codes)), codes);
    }

    #[test]
    fn ascii_revcomp() {
        assert_eq!(revcomp(b"ACGTTN"), b"NAACGT");
    }
}
