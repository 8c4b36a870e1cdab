use core::fmt;

/// Identifies a mobile client session (one registered application).
pub type ConnectionKey = u32;

/// Identifies one logical mobile request. Unique within a connection while
/// the request is outstanding.
pub type MobileCorrelationId = u32;

/// Identifies one HMI sub-request. Unique across the whole process while the
/// sub-request is outstanding.
pub type HmiCorrelationId = u32;

/// Composite key of a mobile request: the connection it arrived on and the
/// correlation id the client gave it.
///
/// Every structure in this crate that tracks mobile requests is keyed by
/// [`ChainKey`], because a [`MobileCorrelationId`] alone is only unique
/// per connection.
///
/// # Example
/// ```
/// use msgchain::ChainKey;
///
/// let key = ChainKey::new(1, 100);
/// assert_eq!(key.connection_key, 1);
/// assert_eq!(key.mobile_correlation_id, 100);
/// assert_eq!(key.to_string(), "1:100");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainKey {
    /// Connection (application) the request arrived on.
    pub connection_key: ConnectionKey,
    /// Correlation id assigned by the mobile client.
    pub mobile_correlation_id: MobileCorrelationId,
}

impl ChainKey {
    /// Creates a key for the given connection and mobile correlation id.
    pub const fn new(
        connection_key: ConnectionKey,
        mobile_correlation_id: MobileCorrelationId,
    ) -> Self {
        Self {
            connection_key,
            mobile_correlation_id,
        }
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connection_key, self.mobile_correlation_id)
    }
}
