//! Interactive editing-session state machine.
//!
//! The session interprets key events against the current screen (browsing
//! the device list, or editing one function's config space) and drives the
//! probe and write engines. Rendering and key polling belong to the
//! front-end; hex-digit collection for value entry does too, and the session
//! receives the completed value via [`Session::submit_value`].

use tracing::warn;

use crate::access::{read_config_space, AccessWidth, ConfigAccess, CONFIG_SPACE_SIZE};
use crate::enumerate::DeviceRecord;
use crate::error::{FabricError, ProbeError, WriteError};
use crate::policy::Safety;
use crate::probe::{probe, ProbeReport};
use crate::write::{write_register, WriteReport};
use crate::Bdf;

/// Rows of the device list shown per page.
pub const DEFAULT_PAGE_SIZE: usize = 18;

/// One key from the interactive input source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyEvent {
    Char(char),
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Escape,
    Enter,
    Tab,
    Function(u8),
}

/// Blocking source of key events.
///
/// `None` means the input stream ended; [`Session::run`] stops pumping.
pub trait InputSource {
    fn next_key(&mut self) -> Option<KeyEvent>;
}

/// Whether the session wants more input.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionStatus {
    Running,
    Finished,
}

/// Operator-facing outcome of the last operation.
///
/// While a notice is pending the next key acknowledges it and is otherwise
/// ignored, so no attempted mutation is silently dropped from view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Notice {
    WriteDone(WriteReport),
    WriteRefused(WriteError),
    ProbeDone(ProbeReport),
    ProbeRefused(ProbeError),
    SnapshotFailed(FabricError),
}

struct Edit {
    bdf: Bdf,
    snapshot: [u8; CONFIG_SPACE_SIZE],
    width: AccessWidth,
    cursor: u16,
    awaiting_value: bool,
}

enum Mode {
    Browsing,
    Editing(Edit),
}

/// What the presentation layer needs in order to draw the current screen.
#[derive(Debug)]
pub enum SessionView<'a> {
    Browsing {
        devices: &'a [DeviceRecord],
        selection: usize,
        page: usize,
        page_size: usize,
    },
    Editing {
        bdf: Bdf,
        snapshot: &'a [u8; CONFIG_SPACE_SIZE],
        width: AccessWidth,
        cursor: u16,
        awaiting_value: bool,
    },
}

/// Per-session interaction state.
///
/// The device list is fixed for the session's lifetime (no live re-scan);
/// the dangerous-write unlock resets to locked on construction.
pub struct Session {
    devices: Vec<DeviceRecord>,
    page_size: usize,
    selection: usize,
    page: usize,
    safety: Safety,
    mode: Mode,
    notice: Option<Notice>,
}

impl Session {
    pub fn new(devices: Vec<DeviceRecord>) -> Self {
        Self::with_page_size(devices, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(devices: Vec<DeviceRecord>, page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be positive");
        Self {
            devices,
            page_size,
            selection: 0,
            page: 0,
            safety: Safety::default(),
            mode: Mode::Browsing,
            notice: None,
        }
    }

    pub fn view(&self) -> SessionView<'_> {
        match &self.mode {
            Mode::Browsing => SessionView::Browsing {
                devices: &self.devices,
                selection: self.selection,
                page: self.page,
                page_size: self.page_size,
            },
            Mode::Editing(edit) => SessionView::Editing {
                bdf: edit.bdf,
                snapshot: &edit.snapshot,
                width: edit.width,
                cursor: edit.cursor,
                awaiting_value: edit.awaiting_value,
            },
        }
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn safety(&self) -> Safety {
        self.safety
    }

    /// Feeds one key into the state machine.
    ///
    /// A pending notice consumes the key as its acknowledgment. Escape on
    /// the browsing screen finishes the session.
    pub fn handle_key<B: ConfigAccess + ?Sized>(
        &mut self,
        bus: &mut B,
        key: KeyEvent,
    ) -> SessionStatus {
        if self.notice.take().is_some() {
            return SessionStatus::Running;
        }

        match self.mode {
            Mode::Browsing => self.handle_browsing_key(bus, key),
            Mode::Editing(_) => self.handle_editing_key(bus, key),
        }
    }

    /// Completes value entry with the collected value.
    ///
    /// Ignored unless the session is editing and waiting for a value. The
    /// write goes through the write engine (and therefore the policy); a
    /// successful write refreshes the whole 256-byte snapshot.
    pub fn submit_value<B: ConfigAccess + ?Sized>(&mut self, bus: &mut B, value: u32) {
        if self.notice.is_some() {
            return;
        }
        let safety = self.safety;
        let Mode::Editing(edit) = &mut self.mode else {
            return;
        };
        if !edit.awaiting_value {
            return;
        }
        edit.awaiting_value = false;

        match write_register(bus, edit.bdf, edit.cursor as u8, edit.width, value, safety) {
            Ok(report) => {
                match read_config_space(bus, edit.bdf) {
                    Ok(snapshot) => edit.snapshot = snapshot,
                    // Keep the stale snapshot; the write itself succeeded
                    // and its report is what the operator must see.
                    Err(err) => warn!(bdf = %edit.bdf, "post-write snapshot failed: {err}"),
                }
                self.notice = Some(Notice::WriteDone(report));
            }
            Err(err) => self.notice = Some(Notice::WriteRefused(err)),
        }
    }

    /// Abandons value entry; returns to editing with no notice.
    pub fn cancel_entry(&mut self) {
        if let Mode::Editing(edit) = &mut self.mode {
            edit.awaiting_value = false;
        }
    }

    /// Pumps keys from `input` until the session finishes or the input
    /// source ends. `present` runs after every accepted key so a front-end
    /// can redraw.
    pub fn run<B, I, F>(&mut self, bus: &mut B, input: &mut I, mut present: F)
    where
        B: ConfigAccess + ?Sized,
        I: InputSource + ?Sized,
        F: FnMut(&Session),
    {
        present(self);
        while let Some(key) = input.next_key() {
            if self.handle_key(bus, key) == SessionStatus::Finished {
                break;
            }
            present(self);
        }
    }

    fn handle_browsing_key<B: ConfigAccess + ?Sized>(
        &mut self,
        bus: &mut B,
        key: KeyEvent,
    ) -> SessionStatus {
        match key {
            KeyEvent::Escape => return SessionStatus::Finished,
            KeyEvent::Enter => self.open_selected(bus),
            KeyEvent::Up => {
                if self.selection > 0 {
                    self.selection -= 1;
                }
            }
            KeyEvent::Down => {
                if self.selection + 1 < self.devices.len() {
                    self.selection += 1;
                }
            }
            KeyEvent::PageDown | KeyEvent::Function(1) => self.page_down(),
            KeyEvent::PageUp | KeyEvent::Function(2) => self.page_up(),
            _ => {}
        }
        self.sync_page();
        SessionStatus::Running
    }

    fn handle_editing_key<B: ConfigAccess + ?Sized>(
        &mut self,
        bus: &mut B,
        key: KeyEvent,
    ) -> SessionStatus {
        let Mode::Editing(edit) = &mut self.mode else {
            return SessionStatus::Running;
        };

        if edit.awaiting_value {
            // The front-end collects digits; only a cancel is meaningful
            // here.
            if key == KeyEvent::Escape {
                edit.awaiting_value = false;
            }
            return SessionStatus::Running;
        }

        match key {
            KeyEvent::Escape => {
                // Back to the list; selection is untouched.
                self.mode = Mode::Browsing;
                return SessionStatus::Running;
            }
            KeyEvent::Tab => {
                edit.width = edit.width.cycle();
            }
            KeyEvent::Function(9) => {
                self.safety.unlock_dangerous = !self.safety.unlock_dangerous;
            }
            KeyEvent::Char('p') | KeyEvent::Char('P') => {
                self.notice = Some(match probe(bus, edit.bdf, edit.cursor, edit.width) {
                    Ok(report) => Notice::ProbeDone(report),
                    Err(err) => Notice::ProbeRefused(err),
                });
            }
            KeyEvent::Enter => {
                edit.awaiting_value = true;
            }
            KeyEvent::Up => {
                if edit.cursor >= 0x10 {
                    edit.cursor -= 0x10;
                }
            }
            KeyEvent::Down => {
                if edit.cursor + 0x10 < CONFIG_SPACE_SIZE as u16 {
                    edit.cursor += 0x10;
                }
            }
            KeyEvent::Left => {
                let step = u16::from(edit.width.bytes());
                if edit.cursor >= step {
                    edit.cursor -= step;
                }
            }
            KeyEvent::Right => {
                let step = u16::from(edit.width.bytes());
                if edit.cursor + step < CONFIG_SPACE_SIZE as u16 {
                    edit.cursor += step;
                }
            }
            _ => {}
        }

        if let Mode::Editing(edit) = &mut self.mode {
            edit.cursor = edit.width.align(edit.cursor);
        }
        SessionStatus::Running
    }

    fn open_selected<B: ConfigAccess + ?Sized>(&mut self, bus: &mut B) {
        let Some(record) = self.devices.get(self.selection) else {
            return;
        };
        match read_config_space(bus, record.bdf) {
            Ok(snapshot) => {
                self.mode = Mode::Editing(Edit {
                    bdf: record.bdf,
                    snapshot,
                    width: AccessWidth::Dword,
                    cursor: 0,
                    awaiting_value: false,
                });
            }
            Err(err) => self.notice = Some(Notice::SnapshotFailed(err)),
        }
    }

    fn max_page(&self) -> usize {
        self.devices.len().div_ceil(self.page_size)
    }

    fn page_down(&mut self) {
        if self.page + 1 < self.max_page() {
            self.page += 1;
            self.selection = (self.page * self.page_size).min(self.devices.len() - 1);
        }
    }

    fn page_up(&mut self) {
        if self.page > 0 {
            self.page -= 1;
            self.selection = self.page * self.page_size;
        }
    }

    /// Keeps the displayed page in step with the selection.
    fn sync_page(&mut self) {
        let max_page = self.max_page();
        if self.page >= max_page {
            self.page = max_page.saturating_sub(1);
        }
        let selection_page = self.selection / self.page_size;
        if selection_page != self.page {
            self.page = selection_page;
        }
    }
}
