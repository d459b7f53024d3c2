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

#[cfg(windows)]
pub mod win;

use crate::error::{Error, Result};
use crate::ssh::agent::SSH_AGENT_FAILURE;
use log::warn;

/// The WM_COPYDATA discriminator Pageant requests carry.
pub const AGENT_COPYDATA_ID: usize = 0x804e_50ba;
/// The size of the shared memory segment a Pageant client maps.
pub const SEGMENT_BYTES: usize = 8192;

/// A callback handling one unframed agent request and returning the unframed
/// reply.
pub type RequestHandler = Box<dyn FnMut(&[u8]) -> Vec<u8>>;

/// Service one Pageant exchange in place: read the length-framed request at
/// the start of `view`, hand it to `handler`, and write the length-framed
/// reply back over the same bytes. Returns the number of bytes written.
/// Failures to parse or fit the exchange are answered with the agent failure
/// message rather than propagated.
pub fn service_request<F: FnMut(&[u8]) -> Vec<u8>>(view: &mut [u8], handler: &mut F) -> usize {
    match try_service(view, handler) {
        Ok(written) => written,
        Err(err) => {
            warn!("transport request failed: {}", err);
            if view.len() >= 5 {
                write_reply(view, &[SSH_AGENT_FAILURE])
            } else {
                0
            }
        }
    }
}

fn try_service<F: FnMut(&[u8]) -> Vec<u8>>(view: &mut [u8], handler: &mut F) -> Result<usize> {
    if view.len() < 4 {
        return Err(Error::Internal(
            "mapped view is smaller than a length header".to_owned(),
        ));
    }
    let declared = u32::from_be_bytes([view[0], view[1], view[2], view[3]]) as usize;
    if declared > view.len() - 4 {
        return Err(Error::OversizedRequest(declared));
    }
    // The request is copied out because the reply is written over it.
    let request = view[4..4 + declared].to_vec();
    let reply = handler(&request);
    if reply.len() > view.len() - 4 {
        return Err(Error::Internal(format!(
            "reply of {} bytes exceeds the transport segment",
            reply.len()
        )));
    }
    Ok(write_reply(view, &reply))
}

fn write_reply(view: &mut [u8], reply: &[u8]) -> usize {
    view[..4].copy_from_slice(&(reply.len() as u32).to_be_bytes());
    view[4..4 + reply.len()].copy_from_slice(reply);
    4 + reply.len()
}
