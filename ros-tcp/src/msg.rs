use serde::{Serialize, de::DeserializeOwned};

use crate::Result;
use crate::entity::TypeInfo;

/// A message type that can travel over TCPROS.
///
/// The type name, md5sum and definition are what the connection header
/// advertises; peers only stream to each other when the md5sums agree.
pub trait RosMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn msg_type() -> &'static str;

    fn md5sum() -> &'static str;

    fn msg_definition() -> &'static str;

    fn type_info() -> TypeInfo {
        TypeInfo::new(Self::msg_type(), Self::md5sum())
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(ros_tcp_ser::to_vec(self)?)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(ros_tcp_ser::from_slice(bytes)?)
    }
}

/// A request/response pair served under one service type.
pub trait RosService: Send + Sync + 'static {
    type Request: RosMessage;
    type Response: RosMessage;

    fn service_type() -> &'static str;

    fn md5sum() -> &'static str;

    fn type_info() -> TypeInfo {
        TypeInfo::new(Self::service_type(), Self::md5sum())
    }
}

/// Implement [`RosMessage`] from constants.
///
/// ```
/// use ros_tcp::impl_ros_message;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Counter {
///     value: u32,
/// }
///
/// impl_ros_message!(Counter, "demo_msgs/Counter", "0123456789abcdef0123456789abcdef", "uint32 value\n");
/// ```
#[macro_export]
macro_rules! impl_ros_message {
    ($ty:ty, $name:expr, $md5sum:expr, $definition:expr) => {
        impl $crate::msg::RosMessage for $ty {
            fn msg_type() -> &'static str {
                $name
            }

            fn md5sum() -> &'static str {
                $md5sum
            }

            fn msg_definition() -> &'static str {
                $definition
            }
        }
    };
}

/// Implement [`RosService`] for a marker type.
#[macro_export]
macro_rules! impl_ros_service {
    ($ty:ty, $request:ty, $response:ty, $name:expr, $md5sum:expr) => {
        impl $crate::msg::RosService for $ty {
            type Request = $request;
            type Response = $response;

            fn service_type() -> &'static str {
                $name
            }

            fn md5sum() -> &'static str {
                $md5sum
            }
        }
    };
}
