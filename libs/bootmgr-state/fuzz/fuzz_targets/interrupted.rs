#![no_main]

extern crate libfuzzer_sys;
extern crate std;

use arbitrary::Arbitrary;
use bootmgr_state::{
    record::BootRecord,
    store::{self, RecordFile},
    volume::mock::{MockVolume, MockVolumeError::EarlyShutoff},
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: Input| fuzz(input.records, input.fail_at));

#[derive(Debug)]
struct Input {
    /// Set of consecutive records to write to disk.
    pub records: Vec<BootRecord>,

    /// Byte number to fail at when doing disk operations.
    pub fail_at: usize,
}

impl<'a> Arbitrary<'a> for Input {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let records: Vec<BootRecord> = Arbitrary::arbitrary(u)?;
        let fail_at = u.int_in_range(0..=records.len() * BootRecord::SIZE)?;
        Ok(Input { records, fail_at })
    }
}

/// Tests for 'a save interrupted at any byte keeps either the old or the new record'.
fn fuzz(records: Vec<BootRecord>, fail_at: usize) {
    let mut volume = MockVolume::new();
    let mut records = records.into_iter().peekable();

    futures::executor::block_on(async {
        let mut prev_record = RecordFile::new(&mut volume).load_or_create().await.unwrap().record;
        volume.bytes_until_shutoff = Some(fail_at as u32);

        while let Some(new_record) = records.peek() {
            match RecordFile::new(&mut volume).save(new_record).await {
                Ok(_) => {
                    assert_eq!(RecordFile::new(&mut volume).get().await, Some(*new_record));
                }
                Err(store::Error::Other(EarlyShutoff(_))) => {
                    volume.remove_shutoff();
                    let old_record = RecordFile::new(&mut volume).get().await;

                    if old_record == Some(prev_record) {
                        // Old record was at least kept, even though the new record was not persisted.
                    } else if old_record == Some(*new_record) {
                        // New record was successfully persisted, even though we had a shutoff.
                    } else {
                        panic!("Record not maintained or persisted");
                    }
                    break;
                }
                Err(e) => panic!("Unexpected error {:?}", e),
            }

            prev_record = *new_record;
            records.next(); // Successfully persisted, drop the record.
        }
    });
}
