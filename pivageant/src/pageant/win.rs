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
use crate::pageant::{service_request, RequestHandler, AGENT_COPYDATA_ID, SEGMENT_BYTES};
use log::{debug, warn};
use rand::Rng;
use std::ffi::c_void;
use std::slice;
use std::str;
use windows::core::PCWSTR;
use windows::w;
use windows::Win32::Foundation::{CloseHandle, HINSTANCE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::DataExchange::COPYDATASTRUCT;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Memory::{
    MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, FILE_MAP_WRITE,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, FindWindowW, GetMessageW,
    GetWindowLongPtrW, LoadCursorW, PostQuitMessage, RegisterClassW, ReplyMessage, SendMessageW,
    SetWindowLongPtrW, TranslateMessage, UnregisterClassW, CREATESTRUCTW, CW_USEDEFAULT,
    GWLP_USERDATA, IDC_ARROW, MSG, WINDOW_EX_STYLE, WM_COPYDATA, WM_DESTROY, WM_NCCREATE,
    WNDCLASSW, WS_OVERLAPPEDWINDOW,
};

// Pageant clients find the agent by this exact class and window name.
const PAGEANT_NAME: PCWSTR = w!("Pageant");

struct WindowState {
    hwnd: HWND,
    instance: HINSTANCE,
    /// A random 31-bit token; a WM_DESTROY carrying it as wParam is our own
    /// shutdown request, as opposed to a stray message from the system.
    close_magic: u32,
    handler: RequestHandler,
}

/// Is a Pageant window (ours or any other agent's) already registered?
pub fn pageant_running() -> bool {
    unsafe { FindWindowW(PAGEANT_NAME, PAGEANT_NAME).0 != 0 }
}

/// The receiving end of the Pageant protocol: a hidden top-level window
/// which answers WM_COPYDATA requests by servicing the client's shared
/// memory segment with the wrapped handler.
pub struct PageantTransport {
    state: *mut WindowState,
}

impl PageantTransport {
    pub fn new(handler: RequestHandler) -> Result<Self> {
        if pageant_running() {
            return Err(Error::Internal(
                "a Pageant window already exists".to_owned(),
            ));
        }

        let instance = unsafe { GetModuleHandleW(None) }?;
        let class = WNDCLASSW {
            hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }?,
            hInstance: instance,
            lpszClassName: PAGEANT_NAME,
            lpfnWndProc: Some(wndproc),
            ..Default::default()
        };
        if unsafe { RegisterClassW(&class) } == 0 {
            return Err(windows::core::Error::from_win32().into());
        }

        let state = Box::into_raw(Box::new(WindowState {
            hwnd: HWND(0),
            instance,
            close_magic: rand::thread_rng().gen::<u32>() >> 1,
            handler,
        }));
        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                PAGEANT_NAME,
                PAGEANT_NAME,
                WS_OVERLAPPEDWINDOW,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                0,
                0,
                None,
                None,
                instance,
                Some(state as *const c_void),
            )
        };
        if hwnd.0 == 0 {
            let err = windows::core::Error::from_win32();
            unsafe {
                UnregisterClassW(PAGEANT_NAME, instance);
                drop(Box::from_raw(state));
            }
            return Err(err.into());
        }
        unsafe {
            (*state).hwnd = hwnd;
        }
        debug!("Pageant window created");
        Ok(PageantTransport { state })
    }

    /// A handle other threads can use to shut the transport down.
    pub fn closer(&self) -> PageantCloser {
        unsafe {
            PageantCloser {
                hwnd: (*self.state).hwnd.0,
                close_magic: (*self.state).close_magic,
            }
        }
    }

    /// Pump messages until the window is closed via a [PageantCloser].
    pub fn run(&mut self) -> Result<()> {
        let mut message = MSG::default();
        loop {
            let result = unsafe { GetMessageW(&mut message, None, 0, 0) };
            match result.0 {
                0 => return Ok(()),
                -1 => return Err(windows::core::Error::from_win32().into()),
                _ => unsafe {
                    TranslateMessage(&message);
                    DispatchMessageW(&message);
                },
            }
        }
    }
}

impl Drop for PageantTransport {
    fn drop(&mut self) {
        unsafe {
            drop(Box::from_raw(self.state));
        }
    }
}

/// Shuts down a running [PageantTransport] from any thread, by sending its
/// window a WM_DESTROY carrying the transport's private close token.
#[derive(Clone, Copy, Debug)]
pub struct PageantCloser {
    hwnd: isize,
    close_magic: u32,
}

impl PageantCloser {
    pub fn close(&self) {
        unsafe {
            SendMessageW(
                HWND(self.hwnd),
                WM_DESTROY,
                WPARAM(self.close_magic as usize),
                LPARAM(0),
            );
        }
    }
}

unsafe fn handle_copy_data(state: &mut WindowState, lparam: LPARAM) -> LRESULT {
    let copy_data = &*(lparam.0 as *const COPYDATASTRUCT);
    if copy_data.dwData != AGENT_COPYDATA_ID {
        debug!("ignoring WM_COPYDATA with id {:#x}", copy_data.dwData);
        return LRESULT(0);
    }
    if copy_data.cbData == 0 || copy_data.lpData.is_null() {
        return LRESULT(0);
    }

    // The payload is the client's file mapping name, NUL-terminated.
    let name_bytes = slice::from_raw_parts(copy_data.lpData as *const u8, copy_data.cbData as usize);
    let name_bytes = match name_bytes.split_last() {
        Some((0, name)) => name,
        _ => name_bytes,
    };
    let name = match str::from_utf8(name_bytes) {
        Ok(name) => name,
        Err(err) => {
            warn!("ignoring request with a non-UTF-8 mapping name: {}", err);
            return LRESULT(0);
        }
    };

    let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
    let mapping = match OpenFileMappingW(FILE_MAP_WRITE.0, false, PCWSTR::from_raw(wide.as_ptr())) {
        Ok(mapping) => mapping,
        Err(err) => {
            warn!("cannot open file mapping '{}': {}", name, err);
            return LRESULT(0);
        }
    };
    let base = MapViewOfFile(mapping, FILE_MAP_WRITE, 0, 0, 0);
    if base.is_null() {
        warn!("cannot map a view of '{}'", name);
        CloseHandle(mapping);
        return LRESULT(0);
    }

    let view = slice::from_raw_parts_mut(base as *mut u8, SEGMENT_BYTES);
    let written = service_request(view, &mut state.handler);
    // The reply is in place before the client is unblocked.
    ReplyMessage(LRESULT(written as isize));

    UnmapViewOfFile(base);
    CloseHandle(mapping);
    LRESULT(1)
}

extern "system" fn wndproc(hwnd: HWND, message: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    unsafe {
        match message {
            WM_NCCREATE => {
                // Stash the state pointer handed to CreateWindowExW where
                // later messages can reach it.
                let create = &*(lparam.0 as *const CREATESTRUCTW);
                SetWindowLongPtrW(hwnd, GWLP_USERDATA, create.lpCreateParams as isize);
                DefWindowProcW(hwnd, message, wparam, lparam)
            }
            WM_COPYDATA => {
                match (GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *mut WindowState).as_mut() {
                    Some(state) => handle_copy_data(state, lparam),
                    None => LRESULT(0),
                }
            }
            WM_DESTROY => {
                let state = (GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *mut WindowState).as_ref();
                match state {
                    // Only our own token shuts the pump down; the system
                    // never sends WM_DESTROY with a nonzero wParam on its
                    // own.
                    Some(state) if wparam.0 == state.close_magic as usize => {
                        debug!("close requested, destroying the Pageant window");
                        DestroyWindow(hwnd);
                        UnregisterClassW(PAGEANT_NAME, state.instance);
                        PostQuitMessage(0);
                        LRESULT(wparam.0 as isize)
                    }
                    _ => DefWindowProcW(hwnd, message, wparam, lparam),
                }
            }
            _ => DefWindowProcW(hwnd, message, wparam, lparam),
        }
    }
}
