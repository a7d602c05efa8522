/// Outcome of a SIOCNT write with no link partner attached.
#[derive(Debug, PartialEq, Eq)]
pub struct SerialControlWrite {
    /// Value stored in SIOCNT.
    pub control: u16,
    /// SIODATA8 after the transfer, when one completed.
    pub data: Option<u16>,
    pub interrupt: bool,
}

/// Handles SIOCNT. A started transfer (bit 7) completes at once; with the
/// internal clock (bit 0) and IRQ enable (bit 14) it also raises the serial IRQ.
#[must_use]
pub const fn write_control(value: u16) -> SerialControlWrite {
    let mut control = value;
    let mut data = None;
    let mut interrupt = false;

    if control & 0x0080 != 0 {
        control &= 0xFF7F;
        if control & 0x0001 != 0 && control & 0x4000 != 0 {
            data = Some(0x00FF);
            interrupt = true;
            control &= 0x7F7F;
        }
    }

    SerialControlWrite {
        control,
        data,
        interrupt,
    }
}
