//! xReserve and ERC20 ABI definitions
//!
//! Uses alloy's sol! macro to generate type-safe bindings for the subset of the
//! contracts the bridge calls.

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    /// xReserve bridge contract (deposit side)
    #[sol(rpc)]
    contract XReserve {
        /// Lock `value` of `localToken` and mint it to `remoteRecipient` on `remoteDomain`
        function depositToRemote(
            uint256 value,
            uint32 remoteDomain,
            bytes32 remoteRecipient,
            address localToken,
            uint256 maxFee,
            bytes hookData
        ) external;
    }
}

sol! {
    /// ERC20 interface (USDC)
    #[sol(rpc)]
    contract ERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
    }
}
