pub mod error;
pub mod models;

pub use models::{
    BrokerMessage, BroccoliError, Delivery, MqConfig, MqQueue, init_mq, settle,
};

pub type Mq = MqQueue;
