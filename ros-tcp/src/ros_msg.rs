//! Common message and service types.

use serde::{Deserialize, Serialize};

use crate::{impl_ros_message, impl_ros_service};

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct RosString {
    pub data: std::string::String,
}

impl_ros_message!(RosString, "std_msgs/String", "992ce8a1687cec8c8bd883ec73ca41d1", "string data\n");

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct Bool {
    pub data: bool,
}

impl_ros_message!(Bool, "std_msgs/Bool", "8b94c1b53db61fb6aed406028ad6332a", "bool data\n");

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct Int16 {
    pub data: i16,
}

impl_ros_message!(Int16, "std_msgs/Int16", "8524586e34fbd7cb1c08c5f5f1ca0e57", "int16 data\n");

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct Int32 {
    pub data: i32,
}

impl_ros_message!(Int32, "std_msgs/Int32", "da5909fbe378aeaf85e547e830cc1bb7", "int32 data\n");

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq)]
pub struct Float64 {
    pub data: f64,
}

impl_ros_message!(Float64, "std_msgs/Float64", "fdb28210bfa9d7c91146260178d9a584", "float64 data\n");

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct Empty {}

impl_ros_message!(Empty, "std_msgs/Empty", "d41d8cd98f00b204e9800998ecf8427e", "");

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl_ros_message!(
    Vector3,
    "geometry_msgs/Vector3",
    "4a842b65f413084dc2b10fb484ea7f17",
    "float64 x\nfloat64 y\nfloat64 z\n"
);

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq)]
pub struct Twist {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl_ros_message!(
    Twist,
    "geometry_msgs/Twist",
    "9f195f881246fdfa2798d1d3eebca84a",
    "Vector3  linear\nVector3  angular\n\n\
     ================================================================================\n\
     MSG: geometry_msgs/Vector3\nfloat64 x\nfloat64 y\nfloat64 z\n"
);

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct AddTwoIntsRequest {
    pub a: i64,
    pub b: i64,
}

impl_ros_message!(
    AddTwoIntsRequest,
    "rospy_tutorials/AddTwoIntsRequest",
    "36d09b846be0b371c5f190354dd3153e",
    "int64 a\nint64 b\n"
);

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct AddTwoIntsResponse {
    pub sum: i64,
}

impl_ros_message!(
    AddTwoIntsResponse,
    "rospy_tutorials/AddTwoIntsResponse",
    "b88405221c77b1878a3cbbfff53428d7",
    "int64 sum\n"
);

pub struct AddTwoInts;

impl_ros_service!(
    AddTwoInts,
    AddTwoIntsRequest,
    AddTwoIntsResponse,
    "rospy_tutorials/AddTwoInts",
    "6a2e34150c00229791cc89ff309fff21"
);

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct TriggerRequest {}

impl_ros_message!(TriggerRequest, "std_srvs/TriggerRequest", "d41d8cd98f00b204e9800998ecf8427e", "");

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct TriggerResponse {
    pub success: bool,
    pub message: std::string::String,
}

impl_ros_message!(
    TriggerResponse,
    "std_srvs/TriggerResponse",
    "937c9679a518e3a18d831e57125ea522",
    "bool success\nstring message\n"
);

pub struct Trigger;

impl_ros_service!(
    Trigger,
    TriggerRequest,
    TriggerResponse,
    "std_srvs/Trigger",
    "937c9679a518e3a18d831e57125ea522"
);

#[derive(Debug, Serialize, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
pub struct SetBoolRequest {
    pub data: bool,
}

impl_ros_message!(SetBoolRequest, "std_srvs/SetBoolRequest", "8b94c1b53db61fb6aed406028ad6332a", "bool data\n");

pub type SetBoolResponse = TriggerResponse;

pub struct SetBool;

impl_ros_service!(
    SetBool,
    SetBoolRequest,
    SetBoolResponse,
    "std_srvs/SetBool",
    "09fb03525b03e7ea1fd3992bafd87e16"
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{RosMessage, RosService};

    #[test]
    fn test_string_wire_bytes() {
        let msg = RosString {
            data: "Hello, ROS!".into(),
        };
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(&bytes[..4], &11u32.to_le_bytes());
        assert_eq!(&bytes[4..], b"Hello, ROS!");
        assert_eq!(RosString::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_twist_is_48_bytes() {
        let twist = Twist {
            linear: Vector3 { x: 1.0, y: 0.0, z: 0.0 },
            angular: Vector3 { x: 0.0, y: 0.0, z: 0.5 },
        };
        assert_eq!(twist.to_bytes().unwrap().len(), 48);
    }

    #[test]
    fn test_empty_messages_have_no_bytes() {
        assert!(Empty {}.to_bytes().unwrap().is_empty());
        assert!(TriggerRequest {}.to_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_type_info() {
        assert_eq!(RosString::type_info().name, "std_msgs/String");
        assert_eq!(AddTwoInts::type_info().md5sum, "6a2e34150c00229791cc89ff309fff21");
        assert_eq!(<SetBool as RosService>::Response::msg_type(), "std_srvs/TriggerResponse");
    }
}
