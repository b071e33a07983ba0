//! Contract interfaces the core speaks to.

use alloy::sol;

sol! {
    /// Factory that deploys asset contracts at CREATE2 addresses.
    #[derive(Debug)]
    interface IAssetFactory {
        function predictAddress(address creator, bytes32 salt) external view returns (address);
        function create(bytes32 salt, bytes params) external returns (address);
    }

    /// Administrative surface of a deployed asset.
    #[derive(Debug)]
    interface IAssetControl {
        function freeze(address account, uint256 amount) external;
        function grantRole(bytes32 role, address account) external;
    }
}
