//! Transaction receipts

use bytes::Bytes;
use canon_primitives::{Address, Gas, H256};

use crate::block::Bloom;

/// Log entry emitted during execution
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics
    pub topics: Vec<H256>,
    /// Unindexed data
    pub data: Bytes,
}

impl Log {
    /// Bloom of the address and every topic
    pub fn bloom(&self) -> Bloom {
        let mut bloom = Bloom::ZERO;
        bloom.accrue(self.address.as_bytes());
        for topic in &self.topics {
            bloom.accrue(topic.as_bytes());
        }
        bloom
    }
}

/// Outcome of one applied transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Whether execution completed without error
    pub success: bool,
    /// World-state root after this transaction
    pub post_state: H256,
    /// Gas used by this and every earlier transaction in the block
    pub cumulative_gas_used: Gas,
    /// Gas used by this transaction
    pub gas_used: Gas,
    /// Bloom of all logs
    pub logs_bloom: Bloom,
    /// Logs emitted
    pub logs: Vec<Log>,
    /// Address of a created contract
    pub contract_address: Option<Address>,
}

impl Receipt {
    /// Build a receipt, deriving the bloom from the logs
    pub fn new(
        success: bool,
        post_state: H256,
        cumulative_gas_used: Gas,
        gas_used: Gas,
        logs: Vec<Log>,
        contract_address: Option<Address>,
    ) -> Self {
        let mut logs_bloom = Bloom::ZERO;
        for log in &logs {
            logs_bloom.accrue_bloom(&log.bloom());
        }
        Self {
            success,
            post_state,
            cumulative_gas_used,
            gas_used,
            logs_bloom,
            logs,
            contract_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_bloom_from_logs() {
        let log = Log {
            address: Address::from_low_u64_be(5),
            topics: vec![H256::from_low_u64_be(6)],
            data: Bytes::from_static(b"payload"),
        };
        let receipt = Receipt::new(true, H256::ZERO, 21_000, 21_000, vec![log.clone()], None);
        assert!(receipt.logs_bloom.contains(log.address.as_bytes()));
        assert!(receipt.logs_bloom.contains(H256::from_low_u64_be(6).as_bytes()));
    }

    #[test]
    fn test_receipt_without_logs_has_empty_bloom() {
        let receipt = Receipt::new(false, H256::ZERO, 0, 0, vec![], None);
        assert!(receipt.logs_bloom.is_empty());
    }
}
