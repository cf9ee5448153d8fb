#![no_main]

extern crate libfuzzer_sys;
extern crate std;

use arbitrary::Arbitrary;
use bootmgr_state::{
    record::BootRecord,
    store::{RecordFile, RECORD_FILE},
    volume::mock::MockVolume,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: Input<'_>| fuzz(input.data, input.new_record));

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    pub data: &'a [u8],
    pub new_record: BootRecord,
}

/// Tests for 'any record file, with valid or invalid data, does not cause a crash'.
fn fuzz(random_data: &[u8], new_record: BootRecord) {
    let mut volume = MockVolume::new().with_file(RECORD_FILE, random_data);

    futures::executor::block_on(async {
        let mut file = RecordFile::new(&mut volume);

        // Fetching should never crash, and only yields a record for well formed data.
        let stored = file.get().await;
        if stored.is_some() {
            assert_eq!(random_data.len(), BootRecord::SIZE);
        }

        // Creation only happens when there was no valid record.
        let fetched = file.load_or_create().await.unwrap();
        assert_eq!(fetched.first_boot, stored.is_none());
        assert_eq!(Some(fetched.record), stored.or(Some(BootRecord::default())));

        // Finally try to update the record.
        file.save(&new_record).await.unwrap();
        assert_eq!(file.get().await, Some(new_record));
    });
}
