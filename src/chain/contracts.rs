use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use serde::Serialize;

use crate::cow::OrderUid;

/// GPv2Settlement on Gnosis Chain (same address on every CoW deployment).
pub const GPV2_SETTLEMENT: Address =
    alloy::primitives::address!("9008D19f58AAbD9eD0D60971565AA8510560ab41");

sol! {
    #[sol(rpc)]
    contract Delay {
        function isModuleEnabled(address module) external view returns (bool);
        function txCooldown() external view returns (uint256);
        function txExpiration() external view returns (uint256);
        function txNonce() external view returns (uint256);
        function queueNonce() external view returns (uint256);
        function getTxCreatedAt(uint256 nonce) external view returns (uint256);
        function execTransactionFromModule(address to, uint256 value, bytes data, uint8 operation) external returns (bool success);
        function executeNextTx(address to, uint256 value, bytes data, uint8 operation) external;
    }
}

sol! {
    contract GPv2Settlement {
        function setPreSignature(bytes orderUid, bool signed) external;
    }
}

sol! {
    #[sol(rpc)]
    contract ERC20 {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Safe `Enum.Operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Operation {
    Call = 0,
    DelegateCall = 1,
}

/// A call routed through the Delay module. Queue and execute must carry the
/// exact same tuple or `executeNextTx` reverts on the transaction hash check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
}

impl ModuleCall {
    /// `setPreSignature(uid, true)` on the settlement contract.
    pub fn presign(settlement: Address, uid: &OrderUid) -> Self {
        Self {
            to: settlement,
            value: U256::ZERO,
            data: presign_calldata(uid),
            operation: Operation::Call,
        }
    }

    pub fn queue_calldata(&self) -> Bytes {
        Delay::execTransactionFromModuleCall {
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            operation: self.operation as u8,
        }
        .abi_encode()
        .into()
    }

    pub fn execute_calldata(&self) -> Bytes {
        Delay::executeNextTxCall {
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            operation: self.operation as u8,
        }
        .abi_encode()
        .into()
    }
}

/// ABI-encode `setPreSignature(orderUid, true)`.
pub fn presign_calldata(uid: &OrderUid) -> Bytes {
    GPv2Settlement::setPreSignatureCall {
        orderUid: uid.0.clone(),
        signed: true,
    }
    .abi_encode()
    .into()
}
