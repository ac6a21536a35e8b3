//! # Blood Group Compatibility
//!
//! Donor → recipient compatibility over the eight ABO/Rh groups.
//!
//! | Donor | Can give to |
//! |-------|-------------|
//! | O-  | everyone |
//! | O+  | O+, A+, B+, AB+ |
//! | A-  | A-, A+, AB-, AB+ |
//! | A+  | A+, AB+ |
//! | B-  | B-, B+, AB-, AB+ |
//! | B+  | B+, AB+ |
//! | AB- | AB-, AB+ |
//! | AB+ | AB+ |

use crate::domain::BloodGroup;

/// Recipients a donor group can give to.
pub fn compatible_recipients(donor: BloodGroup) -> &'static [BloodGroup] {
    use BloodGroup::*;
    match donor {
        ONeg => &[ONeg, OPos, ANeg, APos, BNeg, BPos, AbNeg, AbPos],
        OPos => &[OPos, APos, BPos, AbPos],
        ANeg => &[ANeg, APos, AbNeg, AbPos],
        APos => &[APos, AbPos],
        BNeg => &[BNeg, BPos, AbNeg, AbPos],
        BPos => &[BPos, AbPos],
        AbNeg => &[AbNeg, AbPos],
        AbPos => &[AbPos],
    }
}

/// True if an organ from `donor` may be given to `recipient`.
///
/// Directional: `is_compatible(ONeg, AbPos)` holds, the reverse does not.
pub fn is_compatible(donor: BloodGroup, recipient: BloodGroup) -> bool {
    compatible_recipients(donor).contains(&recipient)
}
