//! Endpoint addressing.
//!
//! Kernels with ports are connected by conduits in the model description.
//! At run time kernels may be replicated, so each side of a conduit resolves
//! to a concrete [`Endpoint`]: kernel name, instance index, port name, and an
//! optional slot. The slot addresses an individual peer replica when one side
//! of the conduit has one more dimension than the other.

use std::fmt;
use std::fmt::Write as _;

use crate::error::{Error, Result};

/// Returns whether `name` is a valid simple identifier.
///
/// Identifiers start with a letter or underscore, followed by letters,
/// digits or underscores.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates a port name, which must be a simple identifier.
pub(crate) fn validate_port_name(name: &str) -> Result<()> {
    if !is_identifier(name) {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Validates a kernel name: one or more identifiers joined by periods.
pub(crate) fn validate_kernel_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.split('.').all(is_identifier) {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

// Appends `[i]` bracket groups for each element of the index.
fn write_index(out: &mut String, index: &[usize]) {
    for i in index {
        write!(out, "[{}]", i).expect("writing to a String cannot fail");
    }
}

/// Formats a kernel plus index as an instance reference, e.g. `macro[13]`.
pub(crate) fn instance_ref(kernel: &str, index: &[usize]) -> String {
    let mut out = String::from(kernel);
    write_index(&mut out, index);
    out
}

/// The place a message is sent from or to.
///
/// An endpoint is a fully resolved address: the kernel name, the index of
/// the kernel instance, the port name, and the slot. Where a conduit
/// connects kernels at the type level, an endpoint identifies one concrete
/// sender or receiver at run time.
///
/// For example, a message sent by a kernel `abc` on port `p1` to the fourth
/// replica of a 10-instance kernel `def` with port `p2` goes from endpoint
/// `abc.p1[3]` to endpoint `def[3].p2`.
///
/// Endpoints carry no validation; malformed port names are rejected earlier,
/// at port lookup. They are created fresh per send or receive call and never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Name of the instance's kernel, possibly hierarchical.
    pub kernel: String,
    /// Index of the kernel instance within its instance set.
    pub index: Vec<usize>,
    /// Name of the port used.
    pub port: String,
    /// Slot to send or receive on; length 0 or 1.
    pub slot: Vec<usize>,
}

impl Endpoint {
    /// Creates an Endpoint.
    pub fn new(
        kernel: impl Into<String>,
        index: Vec<usize>,
        port: impl Into<String>,
        slot: Vec<usize>,
    ) -> Self {
        Self {
            kernel: kernel.into(),
            index,
            port: port.into(),
            slot,
        }
    }

    /// Expresses this endpoint as a canonical reference string.
    ///
    /// The form is `kernel[index...].port[slot...]`, with the bracket
    /// groups omitted when the corresponding sequence is empty.
    pub fn reference(&self) -> String {
        let mut out = instance_ref(&self.kernel, &self.index);
        out.push('.');
        out.push_str(&self.port);
        write_index(&mut out, &self.slot);
        out
    }

    /// Returns a reference to the instance this endpoint lives on.
    ///
    /// This is the endpoint minus its port and slot.
    pub fn instance(&self) -> String {
        instance_ref(&self.kernel, &self.index)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference())
    }
}
