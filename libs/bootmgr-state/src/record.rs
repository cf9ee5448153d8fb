use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Firmware image slot.
///
/// [ImageId::Factory] is the immutable, trusted image and is never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "_test", derive(arbitrary::Arbitrary))]
#[repr(u8)]
pub enum ImageId {
    Factory = 0,
    Update1 = 1,
    Update2 = 2,
    Update3 = 3,
}

impl ImageId {
    /// Number of image slots, and the length of every per-medium location table.
    pub const COUNT: usize = 4;

    /// All slots, in table order.
    pub const ALL: [ImageId; Self::COUNT] = [ImageId::Factory, ImageId::Update1, ImageId::Update2, ImageId::Update3];

    /// Position of this slot in a location table.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Next slot in the user selection cycle.
    ///
    /// The cycle is `Update1 -> Update2 -> Update3 -> Factory -> Update1`.
    pub const fn next_in_cycle(self) -> Self {
        match self {
            ImageId::Update1 => ImageId::Update2,
            ImageId::Update2 => ImageId::Update3,
            ImageId::Update3 => ImageId::Factory,
            ImageId::Factory => ImageId::Update1,
        }
    }
}

/// Verification status of the active image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "_test", derive(arbitrary::Arbitrary))]
#[repr(u8)]
pub enum Status {
    /// The active image was just installed and has to pass a hash check before its first boot.
    PendingCheck = 0,
    /// The active image has been verified, or needs no verification.
    Ready = 1,
}

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseResult {
    /// Stored data does not have the size of a record.
    SizeMismatch,
    /// Stored data has the right size, but holds a field value out of range.
    Invalid,
}

/// The single persisted boot decision.
///
/// Stored verbatim as `[active, status, previous, 0]`, the layout the application writes
/// when it installs an update. The trailing padding byte is ignored when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "_test", derive(arbitrary::Arbitrary))]
pub struct BootRecord {
    /// Slot that should run.
    pub active: ImageId,
    /// Slot to fall back to if `active` fails verification.
    pub previous: ImageId,
    pub status: Status,
}

impl Default for BootRecord {
    /// Record used on the first boot after programming.
    fn default() -> Self {
        Self::new(ImageId::Factory, ImageId::Factory, Status::Ready)
    }
}

impl BootRecord {
    /// Size of the encoded record in bytes.
    pub const SIZE: usize = 4;

    pub const fn new(active: ImageId, previous: ImageId, status: Status) -> Self {
        Self {
            active,
            previous,
            status,
        }
    }

    /// Whether the active image must pass verification before it may be booted.
    ///
    /// The factory image is always trusted.
    pub fn needs_check(&self) -> bool {
        self.active != ImageId::Factory && self.status == Status::PendingCheck
    }

    /// Abandon the active image in favour of the previous one.
    ///
    /// The previous slot becomes [ImageId::Factory], so repeated fallbacks reach the factory image
    /// in at most two steps.
    pub fn fall_back(&mut self) {
        self.active = self.previous;
        self.previous = ImageId::Factory;
        self.status = Status::Ready;
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        [self.active.into(), self.status.into(), self.previous.into(), 0]
    }

    pub fn try_from_bytes(data: &[u8]) -> Result<Self, ParseResult> {
        let &[active, status, previous, _pad] = data else {
            return Err(ParseResult::SizeMismatch);
        };

        match (
            ImageId::try_from(active),
            Status::try_from(status),
            ImageId::try_from(previous),
        ) {
            (Ok(active), Ok(status), Ok(previous)) => Ok(Self::new(active, previous, status)),
            _ => Err(ParseResult::Invalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_records() -> impl Iterator<Item = BootRecord> {
        ImageId::ALL.into_iter().flat_map(|active| {
            ImageId::ALL.into_iter().flat_map(move |previous| {
                [Status::PendingCheck, Status::Ready]
                    .into_iter()
                    .map(move |status| BootRecord::new(active, previous, status))
            })
        })
    }

    /// Test whether we can construct only valid [ImageId] values.
    #[test]
    fn image_id_construction() {
        for i in 0..ImageId::COUNT as u8 {
            assert_eq!(ImageId::try_from(i).unwrap().index(), i as usize);
        }

        for i in ImageId::COUNT as u8..=0xff {
            assert!(ImageId::try_from(i).is_err());
        }
    }

    #[test]
    fn selection_cycle_wraps() {
        let mut id = ImageId::Update1;
        let mut seen = vec![];
        for _ in 0..ImageId::COUNT {
            seen.push(id);
            id = id.next_in_cycle();
        }

        assert_eq!(id, ImageId::Update1);
        assert_eq!(
            seen,
            [ImageId::Update1, ImageId::Update2, ImageId::Update3, ImageId::Factory]
        );
    }

    /// Encode all possible records and test whether we can get the fields back out again.
    #[test]
    fn record_validity_content() {
        for record in all_records() {
            assert_eq!(BootRecord::try_from_bytes(&record.to_bytes()).unwrap(), record);
        }
    }

    /// Try a few handpicked records and assert their layout.
    #[test]
    fn record_layout() {
        assert_eq!(BootRecord::default().to_bytes(), [0, 1, 0, 0]);

        let record = BootRecord::new(ImageId::Update2, ImageId::Factory, Status::PendingCheck);
        assert_eq!(record.to_bytes(), [2, 0, 0, 0]);

        let record = BootRecord::new(ImageId::Update3, ImageId::Update2, Status::PendingCheck);
        assert_eq!(record.to_bytes(), [3, 0, 2, 0]);

        let record = BootRecord::new(ImageId::Update2, ImageId::Update1, Status::Ready);
        assert_eq!(record.to_bytes(), [2, 1, 1, 0]);
    }

    /// Records as written by the application installing an update are accepted as is.
    #[test]
    fn record_from_application() {
        let installed = BootRecord::new(ImageId::Update1, ImageId::Factory, Status::PendingCheck);
        assert_eq!(BootRecord::try_from_bytes(&[1, 0, 0, 0]).unwrap(), installed);

        // Whatever ends up in the padding is not looked at.
        assert_eq!(BootRecord::try_from_bytes(&[1, 0, 0, 0xa5]).unwrap(), installed);
    }

    #[test]
    fn record_rejects_garbage() {
        assert!(matches!(BootRecord::try_from_bytes(&[]), Err(ParseResult::SizeMismatch)));
        assert!(matches!(
            BootRecord::try_from_bytes(&[0, 1, 0]),
            Err(ParseResult::SizeMismatch)
        ));
        assert!(matches!(
            BootRecord::try_from_bytes(&[0, 1, 0, 0, 0]),
            Err(ParseResult::SizeMismatch)
        ));

        // Erased storage.
        assert!(matches!(
            BootRecord::try_from_bytes(&[0xff; 4]),
            Err(ParseResult::Invalid)
        ));

        // Out of range value in any one field.
        for data in [[4, 1, 0, 0], [0, 2, 0, 0], [0, 1, 7, 0]] {
            assert!(matches!(BootRecord::try_from_bytes(&data), Err(ParseResult::Invalid)));
        }
    }

    #[test]
    fn factory_is_never_checked() {
        for record in all_records() {
            if record.active == ImageId::Factory {
                assert!(!record.needs_check());
            } else {
                assert_eq!(record.needs_check(), record.status == Status::PendingCheck);
            }
        }
    }

    /// Falling back repeatedly from any record ends up at the factory image within two steps.
    #[test]
    fn fallback_reaches_factory() {
        for record in all_records() {
            let mut record = record;
            let mut hops = 0;
            while record.active != ImageId::Factory {
                record.fall_back();
                hops += 1;
                assert_eq!(record.status, Status::Ready);
            }

            assert!(hops <= 2, "{record:?} took {hops} hops");
            if hops > 0 {
                assert_eq!(record.previous, ImageId::Factory);
            }
        }
    }
}
