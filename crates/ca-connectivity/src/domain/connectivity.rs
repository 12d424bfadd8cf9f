//! Connectivity types and selection masks.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A single transport family a message can travel over.
///
/// The discriminants are the bit values used in a [`ConnectivityMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum ConnectivityType {
    /// IPv4/IPv6 over any interface.
    Ip = 0x01,
    /// Wired Ethernet.
    Ethernet = 0x02,
    /// WiFi.
    WiFi = 0x04,
    /// Bluetooth classic (EDR).
    BtEdr = 0x08,
    /// Bluetooth low energy.
    BtLe = 0x10,
}

impl ConnectivityType {
    /// Every known type, in bit order.
    pub const ALL: [ConnectivityType; 5] = [
        ConnectivityType::Ip,
        ConnectivityType::Ethernet,
        ConnectivityType::WiFi,
        ConnectivityType::BtEdr,
        ConnectivityType::BtLe,
    ];

    /// The mask bit for this type.
    #[must_use]
    pub const fn bit(self) -> u32 {
        self as u32
    }

    /// Look up the type for a single mask bit.
    #[must_use]
    pub fn from_bit(bit: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.bit() == bit)
    }

    /// Addressed by host and port.
    #[must_use]
    pub const fn is_ip_family(self) -> bool {
        matches!(self, Self::Ip | Self::Ethernet | Self::WiFi)
    }

    /// Addressed by a 48-bit MAC address.
    #[must_use]
    pub const fn is_link_layer(self) -> bool {
        matches!(self, Self::BtEdr | Self::BtLe)
    }

    /// Both types share an address family.
    #[must_use]
    pub const fn same_family(self, other: Self) -> bool {
        (self.is_ip_family() && other.is_ip_family())
            || (self.is_link_layer() && other.is_link_layer())
    }
}

impl fmt::Display for ConnectivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ip => "ip",
            Self::Ethernet => "ethernet",
            Self::WiFi => "wifi",
            Self::BtEdr => "bt-edr",
            Self::BtLe => "bt-le",
        };
        f.write_str(name)
    }
}

/// A set of [`ConnectivityType`] bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnectivityMask(u32);

impl ConnectivityMask {
    /// No transports.
    pub const NONE: Self = Self(0);

    /// Every known transport.
    pub const ALL: Self = Self(0x1F);

    /// Build a mask from raw bits.
    ///
    /// Returns `None` if any bit outside the known set is present.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL.0 != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    /// Raw bit value.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Mask containing exactly one type.
    #[must_use]
    pub const fn single(ty: ConnectivityType) -> Self {
        Self(ty.bit())
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, ty: ConnectivityType) -> bool {
        self.0 & ty.bit() != 0
    }

    pub fn insert(&mut self, ty: ConnectivityType) {
        self.0 |= ty.bit();
    }

    pub fn remove(&mut self, ty: ConnectivityType) {
        self.0 &= !ty.bit();
    }

    /// Bits present in both masks.
    #[must_use]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Bits in `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Iterate the contained types in bit order.
    pub fn iter(self) -> impl Iterator<Item = ConnectivityType> {
        ConnectivityType::ALL
            .into_iter()
            .filter(move |t| self.contains(*t))
    }

    /// Number of contained types.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }
}

impl From<ConnectivityType> for ConnectivityMask {
    fn from(ty: ConnectivityType) -> Self {
        Self::single(ty)
    }
}

impl FromIterator<ConnectivityType> for ConnectivityMask {
    fn from_iter<I: IntoIterator<Item = ConnectivityType>>(iter: I) -> Self {
        let mut mask = Self::NONE;
        for ty in iter {
            mask.insert(ty);
        }
        mask
    }
}

impl BitOr for ConnectivityMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr<ConnectivityType> for ConnectivityMask {
    type Output = Self;

    fn bitor(self, rhs: ConnectivityType) -> Self {
        Self(self.0 | rhs.bit())
    }
}

impl BitOr for ConnectivityType {
    type Output = ConnectivityMask;

    fn bitor(self, rhs: Self) -> ConnectivityMask {
        ConnectivityMask(self.bit() | rhs.bit())
    }
}

impl BitOrAssign<ConnectivityType> for ConnectivityMask {
    fn bitor_assign(&mut self, rhs: ConnectivityType) {
        self.insert(rhs);
    }
}

impl fmt::Display for ConnectivityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for ty in self.iter() {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "{ty}")?;
            first = false;
        }
        Ok(())
    }
}

/// One selected adapter's local view, as returned by a network query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConnectivity {
    pub connectivity_type: ConnectivityType,
    pub interface_name: String,
    pub address: String,
    /// Bound unicast port; 0 if the transport has no ports.
    pub port: u16,
    pub is_connected: bool,
}
