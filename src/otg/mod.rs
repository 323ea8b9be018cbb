//! Register model for the DWC2-style USB OTG core (STM32F2/F4 OTG_FS and OTG_HS)
//!
//! Registers are addressed by byte offset from the core base address:
//! - Global registers (offset 0x000-0x104+)
//! - Host registers (offset 0x400) and per-channel sets (0x500 + 0x20 * n)
//! - Device registers (offset 0x800), IN endpoint sets (0x900 + 0x20 * n)
//!   and OUT endpoint sets (0xB00 + 0x20 * n)
//! - Power and clock gating (offset 0xE00)
//! - Data FIFO windows (0x1000 + 0x1000 * n)
//!
//! Single-bit registers are modeled with `bitflags`. Registers carrying
//! multi-bit fields are packed views generated by [`register_view!`], each
//! field described by an explicit shift and width.

pub mod register;

pub use register::{Mmio, OtgBus, PollBudget};

use bitflags::bitflags;

/// Declare a packed `u32` register view with named field accessors
///
/// `fields` entries are `getter, setter: shift, width;` and yield `u32`
/// values. `flags` entries are `getter, setter: bit;` and yield `bool`.
/// Setters mask the value to the field width and return `&mut Self`.
macro_rules! register_view {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            fields {
                $( $(#[$fmeta:meta])* $get:ident, $set:ident : $shift:expr, $width:expr; )*
            }
            flags {
                $( $(#[$bmeta:meta])* $bget:ident, $bset:ident : $bit:expr; )*
            }
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        #[allow(dead_code)]
        impl $name {
            /// Raw register value
            #[inline(always)]
            pub const fn bits(self) -> u32 {
                self.0
            }

            $(
                $(#[$fmeta])*
                #[inline(always)]
                pub const fn $get(self) -> u32 {
                    (self.0 >> $shift) & ((1u32 << $width) - 1)
                }

                #[doc = concat!("Set the `", stringify!($get), "` field")]
                #[inline(always)]
                pub fn $set(&mut self, value: u32) -> &mut Self {
                    let mask = ((1u32 << $width) - 1) << $shift;
                    self.0 = (self.0 & !mask) | ((value << $shift) & mask);
                    self
                }
            )*

            $(
                $(#[$bmeta])*
                #[inline(always)]
                pub const fn $bget(self) -> bool {
                    self.0 & (1u32 << $bit) != 0
                }

                #[doc = concat!("Set or clear the `", stringify!($bget), "` bit")]
                #[inline(always)]
                pub fn $bset(&mut self, on: bool) -> &mut Self {
                    if on {
                        self.0 |= 1u32 << $bit;
                    } else {
                        self.0 &= !(1u32 << $bit);
                    }
                    self
                }
            )*
        }

        impl From<u32> for $name {
            #[inline(always)]
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl From<$name> for u32 {
            #[inline(always)]
            fn from(value: $name) -> u32 {
                value.0
            }
        }
    };
}

/// Register offsets relative to the core base address
pub mod offsets {
    /// OTG control and status
    pub const GOTGCTL: usize = 0x000;
    /// OTG interrupt
    pub const GOTGINT: usize = 0x004;
    /// AHB configuration
    pub const GAHBCFG: usize = 0x008;
    /// USB configuration
    pub const GUSBCFG: usize = 0x00C;
    /// Reset control
    pub const GRSTCTL: usize = 0x010;
    /// Core interrupt status
    pub const GINTSTS: usize = 0x014;
    /// Core interrupt mask
    pub const GINTMSK: usize = 0x018;
    /// Receive status debug read (no pop)
    pub const GRXSTSR: usize = 0x01C;
    /// Receive status read and pop
    pub const GRXSTSP: usize = 0x020;
    /// Receive FIFO size
    pub const GRXFSIZ: usize = 0x024;
    /// EP0 Tx FIFO size (device) / non-periodic Tx FIFO size (host)
    pub const DIEPTXF0_HNPTXFSIZ: usize = 0x028;
    /// Non-periodic Tx FIFO/queue status
    pub const HNPTXSTS: usize = 0x02C;
    /// I2C access
    pub const GI2CCTL: usize = 0x030;
    /// General core configuration
    pub const GCCFG: usize = 0x038;
    /// Core ID
    pub const CID: usize = 0x03C;
    /// Host periodic Tx FIFO size
    pub const HPTXFSIZ: usize = 0x100;

    /// Host configuration
    pub const HCFG: usize = 0x400;
    /// Host frame interval
    pub const HFIR: usize = 0x404;
    /// Host frame number / time remaining
    pub const HFNUM: usize = 0x408;
    /// Host periodic Tx FIFO/queue status
    pub const HPTXSTS: usize = 0x410;
    /// Host all-channels interrupt
    pub const HAINT: usize = 0x414;
    /// Host all-channels interrupt mask
    pub const HAINTMSK: usize = 0x418;
    /// Host port control and status
    pub const HPRT0: usize = 0x440;

    /// Device configuration
    pub const DCFG: usize = 0x800;
    /// Device control
    pub const DCTL: usize = 0x804;
    /// Device status
    pub const DSTS: usize = 0x808;
    /// Device IN endpoint common interrupt mask
    pub const DIEPMSK: usize = 0x810;
    /// Device OUT endpoint common interrupt mask
    pub const DOEPMSK: usize = 0x814;
    /// Device all-endpoints interrupt
    pub const DAINT: usize = 0x818;
    /// Device all-endpoints interrupt mask
    pub const DAINTMSK: usize = 0x81C;
    /// Device threshold control
    pub const DTHRCTL: usize = 0x830;
    /// Device IN endpoint FIFO empty interrupt mask
    pub const DIEPEMPMSK: usize = 0x834;
    /// Device each-endpoint interrupt (HS dedicated EP1)
    pub const DEACHINT: usize = 0x838;
    /// Device each-endpoint interrupt mask
    pub const DEACHMSK: usize = 0x83C;

    /// Power and clock gating control
    pub const PCGCCTL: usize = 0xE00;

    /// Register stride between channel / endpoint sets
    pub const SET_STRIDE: usize = 0x20;
    /// Stride between data FIFO windows
    pub const FIFO_STRIDE: usize = 0x1000;

    /// Device IN endpoint `n` Tx FIFO size, `n >= 1`
    #[inline(always)]
    pub const fn dieptxf(n: usize) -> usize {
        0x104 + 4 * (n - 1)
    }

    /// Host channel characteristics
    #[inline(always)]
    pub const fn hcchar(ch: usize) -> usize {
        0x500 + SET_STRIDE * ch
    }
    /// Host channel split control
    #[inline(always)]
    pub const fn hcsplt(ch: usize) -> usize {
        0x504 + SET_STRIDE * ch
    }
    /// Host channel interrupt
    #[inline(always)]
    pub const fn hcint(ch: usize) -> usize {
        0x508 + SET_STRIDE * ch
    }
    /// Host channel interrupt mask
    #[inline(always)]
    pub const fn hcintmsk(ch: usize) -> usize {
        0x50C + SET_STRIDE * ch
    }
    /// Host channel transfer size
    #[inline(always)]
    pub const fn hctsiz(ch: usize) -> usize {
        0x510 + SET_STRIDE * ch
    }
    /// Host channel DMA address
    #[inline(always)]
    pub const fn hcdma(ch: usize) -> usize {
        0x514 + SET_STRIDE * ch
    }

    /// Device IN endpoint control
    #[inline(always)]
    pub const fn diepctl(ep: usize) -> usize {
        0x900 + SET_STRIDE * ep
    }
    /// Device IN endpoint interrupt
    #[inline(always)]
    pub const fn diepint(ep: usize) -> usize {
        0x908 + SET_STRIDE * ep
    }
    /// Device IN endpoint transfer size
    #[inline(always)]
    pub const fn dieptsiz(ep: usize) -> usize {
        0x910 + SET_STRIDE * ep
    }
    /// Device IN endpoint DMA address
    #[inline(always)]
    pub const fn diepdma(ep: usize) -> usize {
        0x914 + SET_STRIDE * ep
    }
    /// Device IN endpoint Tx FIFO status
    #[inline(always)]
    pub const fn dtxfsts(ep: usize) -> usize {
        0x918 + SET_STRIDE * ep
    }

    /// Device OUT endpoint control
    #[inline(always)]
    pub const fn doepctl(ep: usize) -> usize {
        0xB00 + SET_STRIDE * ep
    }
    /// Device OUT endpoint interrupt
    #[inline(always)]
    pub const fn doepint(ep: usize) -> usize {
        0xB08 + SET_STRIDE * ep
    }
    /// Device OUT endpoint transfer size
    #[inline(always)]
    pub const fn doeptsiz(ep: usize) -> usize {
        0xB10 + SET_STRIDE * ep
    }
    /// Device OUT endpoint DMA address
    #[inline(always)]
    pub const fn doepdma(ep: usize) -> usize {
        0xB14 + SET_STRIDE * ep
    }

    /// Data FIFO window `n` (push for Tx FIFO n, pop of the shared Rx FIFO)
    #[inline(always)]
    pub const fn dfifo(n: usize) -> usize {
        0x1000 + FIFO_STRIDE * n
    }
}

bitflags! {
    /// Core Interrupt Register (GINTSTS) and Interrupt Mask (GINTMSK)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CoreInterrupt: u32 {
        /// Current mode of operation (CMOD) - Bit 0, set in host mode
        const CURRENT_MODE = 1 << 0;
        /// Mode mismatch (MMIS) - Bit 1
        const MODE_MISMATCH = 1 << 1;
        /// OTG interrupt (OTGINT) - Bit 2
        const OTG = 1 << 2;
        /// Start of frame (SOF) - Bit 3
        const SOF = 1 << 3;
        /// Rx FIFO non-empty (RXFLVL) - Bit 4
        const RX_FIFO_LEVEL = 1 << 4;
        /// Non-periodic Tx FIFO empty (NPTXFE) - Bit 5
        const NP_TX_FIFO_EMPTY = 1 << 5;
        /// Global IN non-periodic NAK effective (GINAKEFF) - Bit 6
        const GLOBAL_IN_NAK_EFFECTIVE = 1 << 6;
        /// Global OUT NAK effective (GONAKEFF) - Bit 7
        const GLOBAL_OUT_NAK_EFFECTIVE = 1 << 7;
        /// Early suspend (ESUSP) - Bit 10
        const EARLY_SUSPEND = 1 << 10;
        /// USB suspend (USBSUSP) - Bit 11
        const USB_SUSPEND = 1 << 11;
        /// USB reset (USBRST) - Bit 12
        const USB_RESET = 1 << 12;
        /// Enumeration done (ENUMDNE) - Bit 13
        const ENUM_DONE = 1 << 13;
        /// Isochronous OUT packet dropped (ISOODRP) - Bit 14
        const ISO_OUT_DROP = 1 << 14;
        /// End of periodic frame (EOPF) - Bit 15
        const END_OF_PERIODIC_FRAME = 1 << 15;
        /// IN endpoint interrupt (IEPINT) - Bit 18
        const IN_ENDPOINT = 1 << 18;
        /// OUT endpoint interrupt (OEPINT) - Bit 19
        const OUT_ENDPOINT = 1 << 19;
        /// Incomplete isochronous IN transfer (IISOIXFR) - Bit 20
        const INCOMPLETE_ISO_IN = 1 << 20;
        /// Incomplete periodic transfer (IPXFR) / incomplete iso OUT (INCOMPISOOUT) - Bit 21
        const INCOMPLETE_PERIODIC = 1 << 21;
        /// Host port interrupt (HPRTINT) - Bit 24
        const HOST_PORT = 1 << 24;
        /// Host channels interrupt (HCINT) - Bit 25
        const HOST_CHANNEL = 1 << 25;
        /// Periodic Tx FIFO empty (PTXFE) - Bit 26
        const P_TX_FIFO_EMPTY = 1 << 26;
        /// Connector ID status change (CIDSCHG) - Bit 28
        const CONNECTOR_ID_CHANGE = 1 << 28;
        /// Disconnect detected (DISCINT) - Bit 29
        const DISCONNECT = 1 << 29;
        /// Session request / new session detected (SRQINT) - Bit 30
        const SESSION_REQUEST = 1 << 30;
        /// Resume / remote wakeup detected (WKUPINT) - Bit 31
        const WAKEUP = 1 << 31;
    }
}

bitflags! {
    /// OTG Interrupt Register (GOTGINT)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OtgInterrupt: u32 {
        /// Session end detected (SEDET) - Bit 2
        const SESSION_END = 1 << 2;
        /// Session request success status change (SRSSCHG) - Bit 8
        const SESSION_REQUEST_CHANGE = 1 << 8;
        /// Host negotiation success status change (HNSSCHG) - Bit 9
        const HOST_NEGOTIATION_CHANGE = 1 << 9;
        /// Host negotiation detected (HNGDET) - Bit 17
        const HOST_NEGOTIATION_DETECTED = 1 << 17;
        /// A-device timeout change (ADTOCHG) - Bit 18
        const A_DEVICE_TIMEOUT = 1 << 18;
        /// Debounce done (DBCDNE) - Bit 19
        const DEBOUNCE_DONE = 1 << 19;
    }
}

bitflags! {
    /// OTG Control and Status Register (GOTGCTL)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OtgControl: u32 {
        /// Session request success (SRQSCS) - Bit 0
        const SESSION_REQUEST_SUCCESS = 1 << 0;
        /// Session request (SRQ) - Bit 1
        const SESSION_REQUEST = 1 << 1;
        /// Host negotiation success (HNGSCS) - Bit 8
        const HOST_NEGOTIATION_SUCCESS = 1 << 8;
        /// HNP request (HNPRQ) - Bit 9
        const HNP_REQUEST = 1 << 9;
        /// Host set HNP enable (HSHNPEN) - Bit 10
        const HOST_HNP_ENABLE = 1 << 10;
        /// Device HNP enabled (DHNPEN) - Bit 11
        const DEVICE_HNP_ENABLE = 1 << 11;
        /// Connector ID status (CIDSTS) - Bit 16, set for B-device
        const CONNECTOR_ID = 1 << 16;
        /// A-session valid (ASVLD) - Bit 18
        const A_SESSION_VALID = 1 << 18;
        /// B-session valid (BSVLD) - Bit 19
        const B_SESSION_VALID = 1 << 19;
    }
}

bitflags! {
    /// AHB Configuration Register (GAHBCFG)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AhbConfig: u32 {
        /// Global interrupt mask (GINTMSK) - Bit 0, set to unmask
        const GLOBAL_INTERRUPT = 1 << 0;
        /// Burst length/type (HBSTLEN) - Bits [4:1]
        const BURST_LENGTH_MASK = 0xF << 1;
        /// INCR4 burst
        const BURST_INCR4 = 0x5 << 1;
        /// DMA enable (DMAEN) - Bit 5
        const DMA_ENABLE = 1 << 5;
        /// Tx FIFO empty level (TXFELVL) - Bit 7, set for completely empty
        const TX_FIFO_EMPTY_LEVEL = 1 << 7;
        /// Periodic Tx FIFO empty level (PTXFELVL) - Bit 8
        const P_TX_FIFO_EMPTY_LEVEL = 1 << 8;
    }
}

bitflags! {
    /// General Core Configuration Register (GCCFG)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CoreConfig: u32 {
        /// Power down deactivated, transceiver active (PWRDWN) - Bit 16
        const POWER_UP = 1 << 16;
        /// I2C interface enable (I2CPADEN) - Bit 17
        const I2C_ENABLE = 1 << 17;
        /// VBUS sensing "A" device (VBUSASEN) - Bit 18
        const VBUS_SENSING_A = 1 << 18;
        /// VBUS sensing "B" device (VBUSBSEN) - Bit 19
        const VBUS_SENSING_B = 1 << 19;
        /// SOF output enable (SOFOUTEN) - Bit 20
        const SOF_OUTPUT = 1 << 20;
        /// VBUS sensing disable (NOVBUSSENS) - Bit 21
        const NO_VBUS_SENSING = 1 << 21;
    }
}

bitflags! {
    /// Reset Control Register (GRSTCTL)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResetControl: u32 {
        /// Core soft reset (CSRST) - Bit 0
        const CORE_SOFT_RESET = 1 << 0;
        /// HCLK soft reset (HSRST) - Bit 1
        const HCLK_SOFT_RESET = 1 << 1;
        /// Host frame counter reset (FCRST) - Bit 2
        const FRAME_COUNTER_RESET = 1 << 2;
        /// Rx FIFO flush (RXFFLSH) - Bit 4
        const RX_FIFO_FLUSH = 1 << 4;
        /// Tx FIFO flush (TXFFLSH) - Bit 5
        const TX_FIFO_FLUSH = 1 << 5;
        /// Tx FIFO number (TXFNUM) - Bits [10:6]
        const TX_FIFO_NUMBER_MASK = 0x1F << 6;
        /// DMA request signal (DMAREQ) - Bit 30
        const DMA_REQUEST = 1 << 30;
        /// AHB master idle (AHBIDL) - Bit 31
        const AHB_IDLE = 1 << 31;
    }
}

impl ResetControl {
    /// TXFNUM value flushing every Tx FIFO
    pub const ALL_TX_FIFOS: u32 = 0x10;

    /// Flush request for Tx FIFO `num`
    pub const fn tx_flush(num: u32) -> Self {
        Self::from_bits_retain(Self::TX_FIFO_FLUSH.bits() | ((num & 0x1F) << 6))
    }
}

bitflags! {
    /// Device Control Register (DCTL)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceControl: u32 {
        /// Remote wakeup signaling (RWUSIG) - Bit 0
        const REMOTE_WAKEUP = 1 << 0;
        /// Soft disconnect (SDIS) - Bit 1
        const SOFT_DISCONNECT = 1 << 1;
        /// Global IN NAK status (GINSTS) - Bit 2
        const GLOBAL_IN_NAK_STATUS = 1 << 2;
        /// Global OUT NAK status (GONSTS) - Bit 3
        const GLOBAL_OUT_NAK_STATUS = 1 << 3;
        /// Set global IN NAK (SGINAK) - Bit 7
        const SET_GLOBAL_IN_NAK = 1 << 7;
        /// Clear global IN NAK (CGINAK) - Bit 8
        const CLEAR_GLOBAL_IN_NAK = 1 << 8;
        /// Set global OUT NAK (SGONAK) - Bit 9
        const SET_GLOBAL_OUT_NAK = 1 << 9;
        /// Clear global OUT NAK (CGONAK) - Bit 10
        const CLEAR_GLOBAL_OUT_NAK = 1 << 10;
        /// Power-on programming done (POPRGDNE) - Bit 11
        const POWER_ON_PROGRAMMING_DONE = 1 << 11;
    }
}

bitflags! {
    /// Device IN Endpoint Interrupt Register (DIEPINTx) and DIEPMSK
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InEndpointInterrupt: u32 {
        /// Transfer completed (XFRC) - Bit 0
        const TRANSFER_COMPLETE = 1 << 0;
        /// Endpoint disabled (EPDISD) - Bit 1
        const ENDPOINT_DISABLED = 1 << 1;
        /// AHB error (AHBERR) - Bit 2
        const AHB_ERROR = 1 << 2;
        /// Timeout condition, control IN (TOC) - Bit 3
        const TIMEOUT = 1 << 3;
        /// IN token received when Tx FIFO empty (ITTXFE) - Bit 4
        const IN_TOKEN_TX_EMPTY = 1 << 4;
        /// IN token received with EP mismatch (INEPNM) - Bit 5
        const IN_TOKEN_EP_MISMATCH = 1 << 5;
        /// IN endpoint NAK effective (INEPNE) - Bit 6
        const NAK_EFFECTIVE = 1 << 6;
        /// Tx FIFO empty (TXFE) - Bit 7, gated by DIEPEMPMSK
        const TX_FIFO_EMPTY = 1 << 7;
        /// Tx FIFO underrun (TXFIFOUDRN) - Bit 8
        const TX_FIFO_UNDERRUN = 1 << 8;
        /// Buffer not available (BNA) - Bit 9
        const BUFFER_NOT_AVAILABLE = 1 << 9;
    }
}

bitflags! {
    /// Device OUT Endpoint Interrupt Register (DOEPINTx) and DOEPMSK
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutEndpointInterrupt: u32 {
        /// Transfer completed (XFRC) - Bit 0
        const TRANSFER_COMPLETE = 1 << 0;
        /// Endpoint disabled (EPDISD) - Bit 1
        const ENDPOINT_DISABLED = 1 << 1;
        /// AHB error (AHBERR) - Bit 2
        const AHB_ERROR = 1 << 2;
        /// SETUP phase done (STUP) - Bit 3
        const SETUP_DONE = 1 << 3;
        /// OUT token received when endpoint disabled (OTEPDIS) - Bit 4
        const OUT_TOKEN_EP_DISABLED = 1 << 4;
        /// Status phase received (STSPHSRX) - Bit 5
        const STATUS_PHASE_RECEIVED = 1 << 5;
        /// Back-to-back SETUP packets received (B2BSTUP) - Bit 6
        const BACK_TO_BACK_SETUP = 1 << 6;
    }
}

bitflags! {
    /// Host Channel Interrupt Register (HCINTx) and HCINTMSKx
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelInterrupt: u32 {
        /// Transfer completed (XFRC) - Bit 0
        const TRANSFER_COMPLETE = 1 << 0;
        /// Channel halted (CHH) - Bit 1
        const HALTED = 1 << 1;
        /// AHB error (AHBERR) - Bit 2
        const AHB_ERROR = 1 << 2;
        /// STALL response received (STALL) - Bit 3
        const STALL = 1 << 3;
        /// NAK response received (NAK) - Bit 4
        const NAK = 1 << 4;
        /// ACK response received/transmitted (ACK) - Bit 5
        const ACK = 1 << 5;
        /// NYET response received (NYET) - Bit 6
        const NYET = 1 << 6;
        /// Transaction error (TXERR) - Bit 7
        const TRANSACTION_ERROR = 1 << 7;
        /// Babble error (BBERR) - Bit 8
        const BABBLE = 1 << 8;
        /// Frame overrun (FRMOR) - Bit 9
        const FRAME_OVERRUN = 1 << 9;
        /// Data toggle error (DTERR) - Bit 10
        const DATA_TOGGLE_ERROR = 1 << 10;
    }
}

bitflags! {
    /// Host Port Control and Status Register (HPRT0)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortControl: u32 {
        /// Port connect status (PCSTS) - Bit 0
        const CONNECT_STATUS = 1 << 0;
        /// Port connect detected (PCDET) - Bit 1, write 1 to clear
        const CONNECT_DETECTED = 1 << 1;
        /// Port enable (PENA) - Bit 2, write 1 disables the port
        const ENABLED = 1 << 2;
        /// Port enable/disable change (PENCHNG) - Bit 3, write 1 to clear
        const ENABLE_CHANGE = 1 << 3;
        /// Port overcurrent active (POCA) - Bit 4
        const OVERCURRENT_ACTIVE = 1 << 4;
        /// Port overcurrent change (POCCHNG) - Bit 5, write 1 to clear
        const OVERCURRENT_CHANGE = 1 << 5;
        /// Port resume (PRES) - Bit 6
        const RESUME = 1 << 6;
        /// Port suspend (PSUSP) - Bit 7
        const SUSPEND = 1 << 7;
        /// Port reset (PRST) - Bit 8
        const RESET = 1 << 8;
        /// Port line status (PLSTS) - Bits [11:10]
        const LINE_STATUS_MASK = 0b11 << 10;
        /// Port power (PPWR) - Bit 12
        const POWER = 1 << 12;
        /// Port test control (PTCTL) - Bits [16:13]
        const TEST_CONTROL_MASK = 0xF << 13;
        /// Port speed (PSPD) - Bits [18:17]
        const SPEED_MASK = 0b11 << 17;
    }
}

impl PortControl {
    /// Bits cleared or disabled by writing 1; never written back from a read
    pub const WRITE_CLEAR: Self = Self::ENABLED
        .union(Self::CONNECT_DETECTED)
        .union(Self::ENABLE_CHANGE)
        .union(Self::OVERCURRENT_CHANGE);

    /// Change bits that raise the port interrupt
    pub const CHANGE_BITS: Self = Self::CONNECT_DETECTED
        .union(Self::ENABLE_CHANGE)
        .union(Self::OVERCURRENT_CHANGE);

    /// Negotiated port speed field
    pub const fn speed(self) -> Option<PortSpeed> {
        PortSpeed::from_port_bits((self.bits() >> 17) & 0b11)
    }
}

bitflags! {
    /// Power and Clock Gating Control Register (PCGCCTL)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClockGating: u32 {
        /// Stop PHY clock (STPPCLK) - Bit 0
        const STOP_PHY_CLOCK = 1 << 0;
        /// Gate HCLK (GATEHCLK) - Bit 1
        const GATE_HCLK = 1 << 1;
        /// PHY suspended (PHYSUSP) - Bit 4
        const PHY_SUSPENDED = 1 << 4;
    }
}

register_view! {
    /// USB Configuration Register (GUSBCFG)
    pub struct UsbConfig {
        fields {
            /// FS timeout calibration (TOCAL)
            timeout_cal, set_timeout_cal: 0, 3;
            /// USB turnaround time in PHY clocks (TRDT)
            turnaround, set_turnaround: 10, 4;
        }
        flags {
            /// PHY interface width, 16-bit UTMI+ (PHYIF)
            phy_16bit, set_phy_16bit: 3;
            /// ULPI instead of UTMI+ (ULPI_UTMI_SEL)
            ulpi_select, set_ulpi_select: 4;
            /// FS serial interface 3-pin (FSINTF)
            fs_interface, set_fs_interface: 5;
            /// Full-speed serial transceiver select (PHYSEL)
            phy_select, set_phy_select: 6;
            /// ULPI DDR select (DDRSEL)
            ddr_select, set_ddr_select: 7;
            /// SRP capable (SRPCAP)
            srp_capable, set_srp_capable: 8;
            /// HNP capable (HNPCAP)
            hnp_capable, set_hnp_capable: 9;
            /// PHY low-power clock select (PHYLPCS)
            phy_low_power_clock, set_phy_low_power_clock: 15;
            /// ULPI FS/LS select (ULPIFSLS)
            ulpi_fsls, set_ulpi_fsls: 17;
            /// ULPI auto-resume (ULPIAR)
            ulpi_auto_resume, set_ulpi_auto_resume: 18;
            /// ULPI clock suspend mode (ULPICSM)
            ulpi_clock_suspend, set_ulpi_clock_suspend: 19;
            /// ULPI external VBUS drive (ULPIEVBUSD)
            ulpi_external_vbus_drive, set_ulpi_external_vbus_drive: 20;
            /// ULPI external VBUS indicator (ULPIEVBUSI)
            ulpi_external_vbus_indicator, set_ulpi_external_vbus_indicator: 21;
            /// TermSel DLine pulsing (TSDPS)
            term_sel_pulse, set_term_sel_pulse: 22;
            /// Force host mode (FHMOD)
            force_host, set_force_host: 29;
            /// Force device mode (FDMOD)
            force_device, set_force_device: 30;
            /// Corrupt Tx packet, debug only (CTXPKT)
            corrupt_tx, set_corrupt_tx: 31;
        }
    }
}

register_view! {
    /// Receive Status Register (GRXSTSR / GRXSTSP)
    ///
    /// `ep_num` is the endpoint number in device mode and the channel number
    /// in host mode.
    pub struct RxStatus {
        fields {
            /// Endpoint / channel number (EPNUM / CHNUM)
            ep_num, set_ep_num: 0, 4;
            /// Byte count of the data packet (BCNT)
            byte_count, set_byte_count: 4, 11;
            /// Data PID (DPID)
            data_pid, set_data_pid: 15, 2;
            /// Packet status tag (PKTSTS)
            packet_status, set_packet_status: 17, 4;
            /// Frame number, iso OUT only (FRMNUM)
            frame_number, set_frame_number: 21, 4;
        }
        flags {}
    }
}

register_view! {
    /// FIFO size registers (GRXFSIZ, DIEPTXFx, HNPTXFSIZ, HPTXFSIZ)
    pub struct FifoSize {
        fields {
            /// RAM start address in words
            start_address, set_start_address: 0, 16;
            /// Depth in words
            depth, set_depth: 16, 16;
        }
        flags {}
    }
}

register_view! {
    /// Tx FIFO / request queue status (HNPTXSTS, HPTXSTS)
    pub struct TxQueueStatus {
        fields {
            /// FIFO space available in words
            fifo_space, set_fifo_space: 0, 16;
            /// Request queue space available
            queue_space, set_queue_space: 16, 8;
            /// Channel number at the top of the request queue
            top_channel, set_top_channel: 27, 4;
        }
        flags {}
    }
}

register_view! {
    /// I2C Access Register (GI2CCTL)
    pub struct I2cControl {
        fields {
            /// I2C read/write data
            rw_data, set_rw_data: 0, 8;
            /// I2C register address
            reg_addr, set_reg_addr: 8, 8;
            /// I2C address of the transceiver
            address, set_address: 16, 7;
            /// I2C device address
            device_address, set_device_address: 26, 2;
        }
        flags {
            /// I2C enable (I2CEN)
            enable, set_enable: 23;
            /// I2C ACK
            ack, set_ack: 24;
            /// I2C suspend control
            suspend_control, set_suspend_control: 25;
            /// DAT/SE0 serial transceiver mode
            dat_se0, set_dat_se0: 28;
            /// Read/write indicator
            read, set_read: 30;
            /// Busy / done
            busy_done, set_busy_done: 31;
        }
    }
}

register_view! {
    /// Host Configuration Register (HCFG)
    pub struct HostConfig {
        fields {
            /// FS/LS PHY clock select (FSLSPCS)
            fsls_clock, set_fsls_clock: 0, 2;
        }
        flags {
            /// FS- and LS-only support (FSLSS)
            fsls_only, set_fsls_only: 2;
        }
    }
}

impl HostConfig {
    /// FSLSPCS value for a 30/60 MHz ULPI clock
    pub const CLOCK_30_60_MHZ: u32 = 0;
    /// FSLSPCS value for a 48 MHz PHY clock
    pub const CLOCK_48_MHZ: u32 = 1;
    /// FSLSPCS value for a 6 MHz PHY clock (low-speed device)
    pub const CLOCK_6_MHZ: u32 = 2;
}

register_view! {
    /// Host Frame Number / Frame Time Remaining Register (HFNUM)
    pub struct FrameNumber {
        fields {
            /// Frame number (FRNUM)
            frame, set_frame: 0, 16;
            /// Frame time remaining (FTREM)
            remaining, set_remaining: 16, 16;
        }
        flags {}
    }
}

register_view! {
    /// Host Channel Characteristics Register (HCCHARx)
    pub struct ChannelCharacteristics {
        fields {
            /// Maximum packet size (MPSIZ)
            max_packet, set_max_packet: 0, 11;
            /// Endpoint number (EPNUM)
            ep_num, set_ep_num: 11, 4;
            /// Endpoint type (EPTYP)
            ep_type, set_ep_type: 18, 2;
            /// Multi count (MCNT)
            multi_count, set_multi_count: 20, 2;
            /// Device address (DAD)
            device_address, set_device_address: 22, 7;
        }
        flags {
            /// Endpoint direction, set for IN (EPDIR)
            ep_dir_in, set_ep_dir_in: 15;
            /// Low-speed device (LSDEV)
            low_speed, set_low_speed: 17;
            /// Odd frame (ODDFRM)
            odd_frame, set_odd_frame: 29;
            /// Channel disable (CHDIS)
            disable, set_disable: 30;
            /// Channel enable (CHENA)
            enable, set_enable: 31;
        }
    }
}

register_view! {
    /// Host Channel Transfer Size Register (HCTSIZx)
    pub struct ChannelTransferSize {
        fields {
            /// Transfer size in bytes (XFRSIZ)
            xfer_size, set_xfer_size: 0, 19;
            /// Packet count (PKTCNT)
            packet_count, set_packet_count: 19, 10;
            /// Data PID (DPID)
            pid, set_pid: 29, 2;
        }
        flags {
            /// Do PING, HS OUT only (DOPING)
            do_ping, set_do_ping: 31;
        }
    }
}

register_view! {
    /// Device Configuration Register (DCFG)
    pub struct DeviceConfig {
        fields {
            /// Device speed (DSPD)
            speed, set_speed: 0, 2;
            /// Device address (DAD)
            address, set_address: 4, 7;
            /// Periodic frame interval (PFIVL)
            periodic_interval, set_periodic_interval: 11, 2;
        }
        flags {
            /// Non-zero-length status OUT handshake (NZLSOHSK)
            nzlso_handshake, set_nzlso_handshake: 2;
        }
    }
}

impl DeviceConfig {
    /// DSPD: high speed
    pub const SPEED_HIGH: u32 = 0;
    /// DSPD: full speed using the HS core's embedded FS PHY
    pub const SPEED_HIGH_IN_FULL: u32 = 1;
    /// DSPD: full speed using the FS core
    pub const SPEED_FULL: u32 = 3;
    /// PFIVL: 80 % of the frame interval
    pub const PERIODIC_INTERVAL_80: u32 = 0;
}

register_view! {
    /// Device Status Register (DSTS)
    pub struct DeviceStatus {
        fields {
            /// Enumerated speed (ENUMSPD)
            enum_speed, set_enum_speed: 1, 2;
            /// Frame number of the received SOF (FNSOF)
            frame, set_frame: 8, 14;
        }
        flags {
            /// Suspend status (SUSPSTS)
            suspended, set_suspended: 0;
            /// Erratic error (EERR)
            erratic, set_erratic: 3;
        }
    }
}

register_view! {
    /// Device IN/OUT Endpoint Control Register (DIEPCTLx / DOEPCTLx)
    pub struct EndpointControl {
        fields {
            /// Maximum packet size (MPSIZ); EP0 uses a 2-bit encoding
            max_packet, set_max_packet: 0, 11;
            /// Endpoint type (EPTYP)
            ep_type, set_ep_type: 18, 2;
            /// Tx FIFO number, IN only (TXFNUM)
            tx_fifo, set_tx_fifo: 22, 4;
        }
        flags {
            /// USB active endpoint (USBAEP)
            active, set_active: 15;
            /// Data PID / even-odd frame (DPID / EONUM)
            data_pid, set_data_pid: 16;
            /// NAK status (NAKSTS)
            nak_status, set_nak_status: 17;
            /// Snoop mode, OUT only (SNPM)
            snoop, set_snoop: 20;
            /// STALL handshake (STALL)
            stall, set_stall: 21;
            /// Clear NAK (CNAK)
            cnak, set_cnak: 26;
            /// Set NAK (SNAK)
            snak, set_snak: 27;
            /// Set DATA0 PID / even frame (SD0PID / SEVNFRM)
            sd0pid, set_sd0pid: 28;
            /// Set DATA1 PID / odd frame (SD1PID / SODDFRM)
            sd1pid, set_sd1pid: 29;
            /// Endpoint disable (EPDIS)
            disable, set_disable: 30;
            /// Endpoint enable (EPENA)
            enable, set_enable: 31;
        }
    }
}

impl EndpointControl {
    /// EP0 MPSIZ encoding for a max-packet size in bytes
    pub const fn ep0_max_packet_code(max_packet: u16) -> u32 {
        match max_packet {
            64.. => 0,
            32..=63 => 1,
            16..=31 => 2,
            _ => 3,
        }
    }
}

register_view! {
    /// Device IN/OUT Endpoint Transfer Size Register (DIEPTSIZx / DOEPTSIZx)
    ///
    /// Bits [30:29] are MCNT for IN, RXDPID for iso OUT and STUPCNT for EP0 OUT.
    pub struct EndpointTransferSize {
        fields {
            /// Transfer size in bytes (XFRSIZ)
            xfer_size, set_xfer_size: 0, 19;
            /// Packet count (PKTCNT)
            packet_count, set_packet_count: 19, 10;
            /// Multi count / received data PID / SETUP packet count
            multi_count, set_multi_count: 29, 2;
        }
        flags {}
    }
}

register_view! {
    /// Device IN Endpoint Tx FIFO Status Register (DTXFSTSx)
    pub struct TxFifoStatus {
        fields {
            /// Tx FIFO space available in words (INEPTFSAV)
            space, set_space: 0, 16;
        }
        flags {}
    }
}

register_view! {
    /// Device Threshold Control Register (DTHRCTL)
    pub struct ThresholdControl {
        fields {
            /// Transmit threshold length in words (TXTHRLEN)
            tx_threshold, set_tx_threshold: 2, 9;
            /// Receive threshold length in words (RXTHRLEN)
            rx_threshold, set_rx_threshold: 17, 9;
        }
        flags {
            /// Non-iso IN endpoint threshold enable (NONISOTHREN)
            non_iso_enable, set_non_iso_enable: 0;
            /// Iso IN endpoint threshold enable (ISOTHREN)
            iso_enable, set_iso_enable: 1;
            /// Receive threshold enable (RXTHREN)
            rx_enable, set_rx_enable: 16;
        }
    }
}

/// Device-mode receive packet status tags (GRXSTSP.PKTSTS)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DevicePacketStatus {
    /// Global OUT NAK
    GlobalOutNak = 1,
    /// OUT data packet received
    DataUpdate = 2,
    /// OUT transfer completed
    TransferComplete = 3,
    /// SETUP transaction completed
    SetupComplete = 4,
    /// SETUP data packet received
    SetupUpdate = 6,
}

impl DevicePacketStatus {
    /// Decode a PKTSTS value
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Self::GlobalOutNak),
            2 => Some(Self::DataUpdate),
            3 => Some(Self::TransferComplete),
            4 => Some(Self::SetupComplete),
            6 => Some(Self::SetupUpdate),
            _ => None,
        }
    }
}

/// Host-mode receive packet status tags (GRXSTSP.PKTSTS)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostPacketStatus {
    /// IN data packet received
    InData = 2,
    /// IN transfer completed
    InTransferComplete = 3,
    /// Data toggle error
    DataToggleError = 5,
    /// Channel halted
    ChannelHalted = 7,
}

impl HostPacketStatus {
    /// Decode a PKTSTS value
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            2 => Some(Self::InData),
            3 => Some(Self::InTransferComplete),
            5 => Some(Self::DataToggleError),
            7 => Some(Self::ChannelHalted),
            _ => None,
        }
    }
}

/// USB bus speed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PortSpeed {
    /// 480 Mbps
    HighSpeed,
    /// 12 Mbps
    FullSpeed,
    /// 1.5 Mbps
    LowSpeed,
}

impl PortSpeed {
    /// Decode HPRT0.PSPD
    pub const fn from_port_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::HighSpeed),
            1 => Some(Self::FullSpeed),
            2 => Some(Self::LowSpeed),
            _ => None,
        }
    }

    /// Decode DSTS.ENUMSPD (1 = FS on 30/60 MHz PHY clock, 3 = FS on 48 MHz)
    pub const fn from_enum_speed(bits: u32) -> Self {
        match bits {
            0 => Self::HighSpeed,
            2 => Self::LowSpeed,
            _ => Self::FullSpeed,
        }
    }
}

/// USB endpoint transfer type, with its EPTYP encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EndpointType {
    /// Control transfers
    Control = 0,
    /// Isochronous transfers
    Isochronous = 1,
    /// Bulk transfers
    Bulk = 2,
    /// Interrupt transfers
    Interrupt = 3,
}

impl EndpointType {
    /// EPTYP field value
    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Periodic (interrupt or isochronous) endpoint
    #[inline(always)]
    pub const fn is_periodic(self) -> bool {
        matches!(self, Self::Isochronous | Self::Interrupt)
    }
}

/// Transfer direction relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

impl Direction {
    /// Direction encoded in bit 7 of an endpoint address
    #[inline(always)]
    pub const fn from_address(ep_addr: u8) -> Self {
        if ep_addr & 0x80 != 0 {
            Self::In
        } else {
            Self::Out
        }
    }
}

/// Bounded wait and settle times
pub mod timeouts {
    /// Iteration cap for AHB idle, soft reset and FIFO flush polls
    pub const POLL_LIMIT: u32 = 200_000;
    /// Settle time after soft reset / flush (3 PHY clocks)
    pub const RESET_SETTLE_US: u32 = 3;
    /// Mode switch settle time (at least 25 ms required)
    pub const MODE_SWITCH_MS: u32 = 50;
    /// Transceiver power-up time
    pub const PHY_POWER_UP_MS: u32 = 20;
    /// Port reset assertion time
    pub const PORT_RESET_ASSERT_MS: u32 = 10;
    /// Recovery after releasing port reset
    pub const PORT_RESET_RECOVERY_MS: u32 = 20;
    /// VBUS rise time after enabling port power
    pub const VBUS_SETTLE_MS: u32 = 200;
    /// Soft connect / disconnect settle time
    pub const SOFT_CONNECT_MS: u32 = 3;
    /// Remote wakeup K-state duration
    pub const REMOTE_WAKEUP_MS: u32 = 5;
}

// Register views must stay a plain u32 so they can be built from raw reads.
const _: () = {
    assert!(core::mem::size_of::<EndpointControl>() == 4);
    assert!(core::mem::size_of::<ChannelCharacteristics>() == 4);
    assert!(offsets::dfifo(0) == 0x1000);
    assert!(offsets::dieptxf(1) == 0x104);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitflag_definitions() {
        assert_eq!(CoreInterrupt::RX_FIFO_LEVEL.bits(), 1 << 4);
        assert_eq!(CoreInterrupt::HOST_CHANNEL.bits(), 1 << 25);
        assert_eq!(ChannelInterrupt::DATA_TOGGLE_ERROR.bits(), 1 << 10);
        assert_eq!(PortControl::RESET.bits(), 1 << 8);
        assert_eq!(PortControl::WRITE_CLEAR.bits(), 0b10_1110);
        assert_eq!(ResetControl::tx_flush(ResetControl::ALL_TX_FIFOS).bits(), (1 << 5) | (0x10 << 6));
    }

    #[test]
    fn test_register_offsets() {
        assert_eq!(offsets::hcchar(0), 0x500);
        assert_eq!(offsets::hctsiz(3), 0x570);
        assert_eq!(offsets::diepctl(1), 0x920);
        assert_eq!(offsets::dtxfsts(2), 0x958);
        assert_eq!(offsets::doeptsiz(0), 0xB10);
        assert_eq!(offsets::dieptxf(3), 0x10C);
        assert_eq!(offsets::dfifo(2), 0x3000);
    }

    #[test]
    fn test_view_field_accessors() {
        let mut hcchar = ChannelCharacteristics::default();
        hcchar
            .set_max_packet(512)
            .set_ep_num(2)
            .set_ep_dir_in(true)
            .set_ep_type(EndpointType::Bulk.bits())
            .set_device_address(5)
            .set_enable(true);
        assert_eq!(hcchar.max_packet(), 512);
        assert_eq!(hcchar.ep_num(), 2);
        assert!(hcchar.ep_dir_in());
        assert_eq!(hcchar.ep_type(), 2);
        assert_eq!(hcchar.device_address(), 5);
        assert_eq!(hcchar.bits() >> 31, 1);
    }

    #[test]
    fn test_view_setter_masks_to_width() {
        let mut tsiz = EndpointTransferSize::default();
        tsiz.set_packet_count(0x7FF);
        // 10-bit field keeps only the low 10 bits and leaves neighbours clear
        assert_eq!(tsiz.packet_count(), 0x3FF);
        assert_eq!(tsiz.xfer_size(), 0);
        assert_eq!(tsiz.multi_count(), 0);
    }

    #[test]
    fn test_rx_status_decode() {
        // EP1, 64 bytes, DATA1, OUT data update
        let raw = 1 | (64 << 4) | (2 << 15) | (2 << 17);
        let status = RxStatus(raw);
        assert_eq!(status.ep_num(), 1);
        assert_eq!(status.byte_count(), 64);
        assert_eq!(
            DevicePacketStatus::from_bits(status.packet_status()),
            Some(DevicePacketStatus::DataUpdate)
        );
        assert_eq!(HostPacketStatus::from_bits(7), Some(HostPacketStatus::ChannelHalted));
        assert_eq!(HostPacketStatus::from_bits(1), None);
    }

    #[test]
    fn test_speed_decoding() {
        assert_eq!(PortControl::from_bits_retain(2 << 17).speed(), Some(PortSpeed::LowSpeed));
        assert_eq!(PortSpeed::from_port_bits(3), None);
        assert_eq!(PortSpeed::from_enum_speed(0), PortSpeed::HighSpeed);
        assert_eq!(PortSpeed::from_enum_speed(3), PortSpeed::FullSpeed);
        assert_eq!(PortSpeed::from_enum_speed(1), PortSpeed::FullSpeed);
    }

    #[test]
    fn test_ep0_max_packet_codes() {
        assert_eq!(EndpointControl::ep0_max_packet_code(64), 0);
        assert_eq!(EndpointControl::ep0_max_packet_code(32), 1);
        assert_eq!(EndpointControl::ep0_max_packet_code(16), 2);
        assert_eq!(EndpointControl::ep0_max_packet_code(8), 3);
    }

    #[test]
    fn test_queue_top_channel() {
        let sts = TxQueueStatus((5 << 27) | (8 << 16) | 96);
        assert_eq!(sts.top_channel(), 5);
        assert_eq!(sts.queue_space(), 8);
        assert_eq!(sts.fifo_space(), 96);
    }
}
