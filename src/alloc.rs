//! Free-space allocation strategy shared by the MBR (choosing among its four
//! slots) and the EBR chain (choosing among gaps inside an extended
//! partition). Ties are broken by the lower start offset.

use crate::mbr::Fit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: i64,
    pub size: i64,
}

/// Picks a gap from `gaps` per the given fit strategy, returning its index.
/// `gaps` need not be sorted. Returns `None` if no gap is at least `needed`
/// bytes.
pub fn choose(gaps: &[Gap], needed: i64, fit: Fit) -> Option<usize> {
    let mut best: Option<(usize, Gap)> = None;
    for (i, &g) in gaps.iter().enumerate() {
        if g.size < needed {
            continue;
        }
        best = Some(match best {
            None => (i, g),
            Some((bi, bg)) => {
                let replace = match fit {
                    Fit::First => g.start < bg.start,
                    Fit::Best => g.size < bg.size || (g.size == bg.size && g.start < bg.start),
                    Fit::Worst => g.size > bg.size || (g.size == bg.size && g.start < bg.start),
                };
                if replace {
                    (i, g)
                } else {
                    (bi, bg)
                }
            }
        });
    }
    best.map(|(i, _)| i)
}
