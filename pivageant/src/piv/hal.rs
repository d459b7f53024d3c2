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

use crate::error::{Error, Result};
use crate::piv::apdu::{Apdu, APDU_DATA_BYTES};
use crate::piv::id::Instruction;
use crate::piv::sw::StatusWord;
use data_encoding::HEXLOWER;
use libc::c_char;
use log::debug;
use pcsc_sys::{
    g_rgSCardT1Pci, SCardConnect, SCardDisconnect, SCardEstablishContext, SCardIsValidContext,
    SCardListReaders, SCardReleaseContext, SCardStatus, SCardTransmit, DWORD, LONG, SCARDCONTEXT,
    SCARDHANDLE, SCARD_PROTOCOL_T1, SCARD_PROTOCOL_UNDEFINED, SCARD_RESET_CARD, SCARD_SCOPE_SYSTEM,
    SCARD_SHARE_SHARED, SCARD_S_SUCCESS,
};
use std::ffi::CString;
use std::ptr;
use std::str;
use std::time::Instant;

// The data length of each intermediate block when a payload is split across
// a command chain. The final block may carry up to the full 255 bytes.
const CHAIN_BLOCK_BYTES: usize = 247;
// An APDU's worth of response data plus the status word.
const RECV_BUFFER_BYTES: usize = 261;
const MAX_ATR_BYTES: usize = 33;
const READER_NAME_BUFFER_BYTES: usize = 256;

/// The hardware abstraction layer separating card access from the PC/SC
/// plumbing underneath it, so the protocol logic can run against mock
/// hardware in tests.
pub trait PcscHal {
    /// Construct a new HAL, attaching to the system's reader subsystem.
    fn new() -> Result<Self>
    where
        Self: Sized;

    /// List the names of the connected card readers. An empty list is not an
    /// error.
    fn list_readers(&self) -> Result<Vec<String>>;

    /// Connect to the card in the given reader.
    fn connect_impl(&mut self, reader: &str) -> Result<()>;

    /// Drop the current card connection, if any. Must be safe to call
    /// repeatedly.
    fn disconnect(&mut self);

    /// Return the answer-to-reset of the currently connected card.
    fn atr(&self) -> Result<Vec<u8>>;

    /// Send a single raw APDU, returning the status word and any response
    /// data (without the trailing status bytes).
    fn send_data_impl(&self, apdu: &Apdu) -> Result<(StatusWord, Vec<u8>)>;

    /// Send a single APDU, logging the exchange.
    fn transmit(&self, apdu: &Apdu) -> Result<(StatusWord, Vec<u8>)> {
        debug!("> {}", HEXLOWER.encode(apdu.raw_minimal()));
        let start = Instant::now();
        let result = self.send_data_impl(apdu);
        match &result {
            Ok((sw, data)) => debug!(
                "< {} {} ({:?})",
                HEXLOWER.encode(data),
                sw,
                start.elapsed()
            ),
            Err(err) => debug!("< transmit failed: {} ({:?})", err, start.elapsed()),
        }
        result
    }

    /// Send a full command to the card: `templ` holds the class,
    /// instruction, and parameter bytes, and `data` the payload of any
    /// length. Payloads too large for one APDU are split across a command
    /// chain, partial responses are drained with GET RESPONSE, and the final
    /// status word is translated into `Ok` or the error it stands for.
    fn send_command(&self, templ: &[u8; 4], data: &[u8]) -> Result<Vec<u8>> {
        let mut remaining = data;
        while remaining.len() > APDU_DATA_BYTES {
            let (block, rest) = remaining.split_at(CHAIN_BLOCK_BYTES);
            // Every block before the last carries the chaining class bit.
            let apdu = Apdu::from_pieces(
                templ[0] | 0x10,
                templ[1],
                templ[2],
                templ[3],
                block.len() as u8,
                block,
            )?;
            let (sw, _) = self.transmit(&apdu)?;
            sw.error()?;
            remaining = rest;
        }

        let apdu = Apdu::from_pieces(
            templ[0],
            templ[1],
            templ[2],
            templ[3],
            remaining.len() as u8,
            remaining,
        )?;
        let (mut sw, mut response) = self.transmit(&apdu)?;
        while sw.bytes_remaining().is_some() {
            let apdu = Apdu::from_pieces(0x00, Instruction::GetResponse.to_value(), 0x00, 0x00, 0, &[])?;
            let (next_sw, mut next) = self.transmit(&apdu)?;
            response.append(&mut next);
            sw = next_sw;
        }
        sw.error()?;
        Ok(response)
    }
}

fn scard_message(status: LONG) -> String {
    let text = match status {
        pcsc_sys::SCARD_E_CANCELLED => "the operation was cancelled",
        pcsc_sys::SCARD_E_INVALID_HANDLE => "invalid handle",
        pcsc_sys::SCARD_E_NO_SERVICE => "the smartcard resource manager is not running",
        pcsc_sys::SCARD_E_NO_SMARTCARD => "no smartcard in the reader",
        pcsc_sys::SCARD_E_NOT_TRANSACTED => "the transaction failed",
        pcsc_sys::SCARD_E_PROTO_MISMATCH => "protocol mismatch",
        pcsc_sys::SCARD_E_READER_UNAVAILABLE => "the reader is unavailable",
        pcsc_sys::SCARD_E_SHARING_VIOLATION => "the card is in use by another process",
        pcsc_sys::SCARD_E_TIMEOUT => "the operation timed out",
        pcsc_sys::SCARD_E_UNKNOWN_READER => "unknown reader name",
        pcsc_sys::SCARD_W_REMOVED_CARD => "the card has been removed",
        pcsc_sys::SCARD_W_RESET_CARD => "the card was reset",
        _ => "unrecognized PC/SC error",
    };
    format!("{} ({:#010x})", text, status as u32)
}

fn scard_check(function: &'static str, status: LONG) -> Result<()> {
    if status == SCARD_S_SUCCESS {
        Ok(())
    } else {
        Err(Error::ConnectionFailure(format!(
            "{} failed: {}",
            function,
            scard_message(status)
        )))
    }
}

/// The real PC/SC implementation of [PcscHal].
pub struct PcscHardware {
    context: SCARDCONTEXT,
    card: SCARDHANDLE,
}

impl PcscHal for PcscHardware {
    fn new() -> Result<Self> {
        let mut context: SCARDCONTEXT = 0;
        let status = unsafe {
            SCardEstablishContext(SCARD_SCOPE_SYSTEM, ptr::null(), ptr::null(), &mut context)
        };
        scard_check("SCardEstablishContext", status)?;
        Ok(PcscHardware { context, card: 0 })
    }

    fn list_readers(&self) -> Result<Vec<String>> {
        let mut readers_len: DWORD = 0;
        let status = unsafe {
            SCardListReaders(self.context, ptr::null(), ptr::null_mut(), &mut readers_len)
        };
        if status == pcsc_sys::SCARD_E_NO_READERS_AVAILABLE {
            return Ok(Vec::new());
        }
        scard_check("SCardListReaders", status)?;

        let mut buffer: Vec<u8> = vec![0; readers_len as usize];
        let status = unsafe {
            SCardListReaders(
                self.context,
                ptr::null(),
                buffer.as_mut_ptr() as *mut c_char,
                &mut readers_len,
            )
        };
        if status == pcsc_sys::SCARD_E_NO_READERS_AVAILABLE {
            return Ok(Vec::new());
        }
        scard_check("SCardListReaders", status)?;

        // The buffer holds a multi-string: NUL-terminated names, with an
        // empty name marking the end.
        Ok(str::from_utf8(&buffer)?
            .split('\0')
            .filter(|reader| !reader.is_empty())
            .map(|reader| reader.to_owned())
            .collect())
    }

    fn connect_impl(&mut self, reader: &str) -> Result<()> {
        let reader = CString::new(reader)?;
        let mut active_protocol: DWORD = SCARD_PROTOCOL_UNDEFINED;
        let status = unsafe {
            SCardConnect(
                self.context,
                reader.as_ptr(),
                SCARD_SHARE_SHARED,
                SCARD_PROTOCOL_T1,
                &mut self.card,
                &mut active_protocol,
            )
        };
        scard_check("SCardConnect", status)
    }

    fn disconnect(&mut self) {
        if self.card != 0 {
            unsafe {
                SCardDisconnect(self.card, SCARD_RESET_CARD);
            }
            self.card = 0;
        }
    }

    fn atr(&self) -> Result<Vec<u8>> {
        let mut reader_name = [0 as c_char; READER_NAME_BUFFER_BYTES];
        let mut reader_len: DWORD = READER_NAME_BUFFER_BYTES as DWORD;
        let mut state: DWORD = 0;
        let mut protocol: DWORD = 0;
        let mut atr = [0_u8; MAX_ATR_BYTES];
        let mut atr_len: DWORD = MAX_ATR_BYTES as DWORD;
        let status = unsafe {
            SCardStatus(
                self.card,
                reader_name.as_mut_ptr(),
                &mut reader_len,
                &mut state,
                &mut protocol,
                atr.as_mut_ptr(),
                &mut atr_len,
            )
        };
        scard_check("SCardStatus", status)?;
        Ok(atr[..atr_len as usize].to_vec())
    }

    fn send_data_impl(&self, apdu: &Apdu) -> Result<(StatusWord, Vec<u8>)> {
        let send = apdu.raw_minimal();
        let mut recv_buffer = vec![0_u8; RECV_BUFFER_BYTES];
        let mut recv_length = recv_buffer.len() as DWORD;
        let status = unsafe {
            SCardTransmit(
                self.card,
                &g_rgSCardT1Pci,
                send.as_ptr(),
                send.len() as DWORD,
                ptr::null_mut(),
                recv_buffer.as_mut_ptr(),
                &mut recv_length,
            )
        };
        scard_check("SCardTransmit", status)?;
        let recv_length = recv_length as usize;
        let sw = StatusWord::new(&recv_buffer, recv_length)?;
        recv_buffer.truncate(recv_length - 2);
        Ok((sw, recv_buffer))
    }
}

impl Drop for PcscHardware {
    fn drop(&mut self) {
        self.disconnect();
        if unsafe { SCardIsValidContext(self.context) } == SCARD_S_SUCCESS {
            unsafe {
                SCardReleaseContext(self.context);
            }
            self.context = 0;
        }
    }
}
