//! Ports and their shape rules.

use crate::error::{Error, Result};

/// The operator a port belongs to.
///
/// Operators describe where in an instance's compute cycle a port is used:
/// `FInit` receives initial state, `OI` sends intermediate observations,
/// `S` receives intermediate state, `B` receives boundary conditions, and
/// `OF` sends the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    FInit,
    OI,
    S,
    B,
    OF,
}

impl Operator {
    /// Returns whether ports of this operator send messages.
    pub fn allows_sending(self) -> bool {
        matches!(self, Operator::OI | Operator::OF)
    }

    /// Returns whether ports of this operator receive messages.
    pub fn allows_receiving(self) -> bool {
        matches!(self, Operator::FInit | Operator::S | Operator::B)
    }
}

/// A gateway through which an instance exchanges messages with the world.
///
/// Ports have a name and an operator, and a shape that determines the valid
/// slot indices for sending or receiving on them. A scalar port has no
/// length; a vector port always has one (zero when not yet sized). The shape
/// is derived at connect time from the dimensions of this instance's set and
/// its peer's set, and must differ between the two by at most one dimension.
///
/// A vector port whose peer set has exactly the same dimensionality is
/// *resizable*: its length is whatever the sending side last reported,
/// starting at zero.
#[derive(Debug, Clone)]
pub struct Port {
    name: String,
    operator: Operator,
    is_connected: bool,
    length: Option<usize>,
    is_resizable: bool,
    // One open flag for a scalar port, one per slot for a vector port.
    is_open: Vec<bool>,
}

impl Port {
    /// Creates a Port, validating its shape against the peer instance set.
    ///
    /// `our_ndims` is the dimensionality of this instance's own set and
    /// `peer_dims` the dimension sizes of the peer set this port connects
    /// to. Fails with [`Error::PortShape`] when the two differ by more than
    /// the single dimension a slot can bridge.
    pub fn new(
        name: impl Into<String>,
        operator: Operator,
        is_vector: bool,
        is_connected: bool,
        our_ndims: usize,
        peer_dims: &[usize],
    ) -> Result<Self> {
        let name = name.into();

        let length = if is_vector {
            if our_ndims == peer_dims.len() {
                Some(0)
            } else if our_ndims + 1 == peer_dims.len() {
                Some(peer_dims[peer_dims.len() - 1])
            } else if our_ndims > peer_dims.len() {
                return Err(Error::PortShape {
                    port: name,
                    reason: "the vector port is connected to an instance set with fewer \
                             dimensions; connect it to a scalar port on a set with one more \
                             dimension, or to a vector port on a set with the same dimensions"
                        .into(),
                });
            } else {
                return Err(Error::PortShape {
                    port: name,
                    reason: "the peer instance set has more than one dimension more than \
                             this port's own set"
                        .into(),
                });
            }
        } else {
            if our_ndims < peer_dims.len() {
                return Err(Error::PortShape {
                    port: name,
                    reason: "the scalar port is connected to an instance set with more \
                             dimensions; connect it to a scalar port on a set with the same \
                             dimensions, or to a vector port on a set with one less dimension"
                        .into(),
                });
            }
            if our_ndims > peer_dims.len() + 1 {
                return Err(Error::PortShape {
                    port: name,
                    reason: "the scalar port is connected to an instance set with at least \
                             two fewer dimensions"
                        .into(),
                });
            }
            None
        };

        let is_resizable = is_vector && our_ndims == peer_dims.len();
        let is_open = match length {
            Some(len) => vec![true; len],
            None => vec![true],
        };

        Ok(Self {
            name,
            operator,
            is_connected,
            length,
            is_resizable,
            is_open,
        })
    }

    /// The name of this port.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The operator this port belongs to.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Returns whether this port is connected to a peer.
    ///
    /// Disconnected ports are a normal state: a port can exist in an
    /// instance's declarations without any live conduit attached to it.
    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// Returns whether this is a vector port.
    pub fn is_vector(&self) -> bool {
        self.length.is_some()
    }

    /// Returns whether this port can be resized at run time.
    pub fn is_resizable(&self) -> bool {
        self.is_resizable
    }

    /// Returns the current length of this vector port.
    ///
    /// Fails with [`Error::NoLength`] on a scalar port.
    pub fn length(&self) -> Result<usize> {
        self.length.ok_or_else(|| Error::NoLength(self.name.clone()))
    }

    /// Sets the length of a resizable vector port.
    ///
    /// Newly created slots start open. Fails with [`Error::NotResizable`]
    /// unless [`Port::is_resizable`] holds.
    pub fn set_length(&mut self, length: usize) -> Result<()> {
        if !self.is_resizable {
            return Err(Error::NotResizable(self.name.clone()));
        }
        self.length = Some(length);
        self.is_open.resize(length, true);
        Ok(())
    }

    /// Returns whether this port, or one slot of it, is open.
    ///
    /// Without a slot, a vector port counts as open while all of its slots
    /// are. A slot outside the current length reports closed.
    pub fn is_open(&self, slot: Option<usize>) -> bool {
        match slot {
            Some(slot) => self.is_open.get(slot).copied().unwrap_or(false),
            None => self.is_open.iter().all(|&open| open),
        }
    }

    /// Marks this port, or one slot of it, as closed.
    ///
    /// Called when a port-closed sentinel arrives; no more messages will be
    /// exchanged through the closed port or slot.
    pub fn set_closed(&mut self, slot: Option<usize>) {
        match slot {
            Some(slot) => {
                if let Some(open) = self.is_open.get_mut(slot) {
                    *open = false;
                }
            }
            None => self.is_open.fill(false),
        }
    }
}
