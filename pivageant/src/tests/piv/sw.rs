// Copyright 2017 Axel Rasmussen
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::Error;
use crate::piv::sw::StatusWord;

#[test]
fn test_status_word_from_buffer() {
    let sw = StatusWord::new(&[0xaa, 0xbb, 0x90, 0x00], 4).unwrap();
    assert_eq!(0x9000, sw.value());
    assert!(sw.success());

    // Only `length` bytes count, even if the buffer is longer.
    let sw = StatusWord::new(&[0x61, 0x10, 0x00, 0x00], 2).unwrap();
    assert_eq!(0x6110, sw.value());

    assert!(StatusWord::new(&[0x90], 1).is_err());
    assert!(StatusWord::new(&[0x90, 0x00], 4).is_err());
}

#[test]
fn test_bytes_remaining() {
    assert_eq!(
        Some(0x05),
        StatusWord::new_from_value(0x6105).bytes_remaining()
    );
    assert_eq!(
        Some(0),
        StatusWord::new_from_value(0x6100).bytes_remaining()
    );
    // The legacy GET RESPONSE form some cards answer with.
    assert_eq!(
        Some(0x10),
        StatusWord::new_from_value(0x9f10).bytes_remaining()
    );
    assert_eq!(None, StatusWord::new_from_value(0x9000).bytes_remaining());
    assert_eq!(None, StatusWord::new_from_value(0x6a82).bytes_remaining());
}

#[test]
fn test_retry_counter() {
    assert_eq!(
        Some(3),
        StatusWord::new_from_value(0x63c3).retry_counter()
    );
    assert_eq!(
        Some(0),
        StatusWord::new_from_value(0x63c0).retry_counter()
    );
    // A blocked method is zero retries.
    assert_eq!(
        Some(0),
        StatusWord::new_from_value(0x6983).retry_counter()
    );
    assert_eq!(None, StatusWord::new_from_value(0x9000).retry_counter());
}

#[test]
fn test_error_translation() {
    assert!(StatusWord::new_from_value(0x9000).error().is_ok());
    assert!(StatusWord::new_from_value(0x6105).error().is_ok());
    assert!(matches!(
        StatusWord::new_from_value(0x63c2).error().unwrap_err(),
        Error::PinRetry { retries_left: 2 }
    ));
    assert!(matches!(
        StatusWord::new_from_value(0x6982).error().unwrap_err(),
        Error::CardStatus(0x6982)
    ));
}

#[test]
fn test_display_includes_description() {
    assert_eq!(
        "0x9000 (success)",
        StatusWord::new_from_value(0x9000).to_string()
    );
    assert_eq!(
        "0x6a82 (file or application not found)",
        StatusWord::new_from_value(0x6a82).to_string()
    );
}
