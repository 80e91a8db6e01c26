use ethers::contract::{abigen, BaseContract};
use lazy_static::lazy_static;

abigen!(
    IButterRouter,
    r#"[
        function owner() external view returns (address)
        function feeManager() external view returns (address)
        function wToken() external view returns (address)
        function bridgeAddress() external view returns (address)
        function mosAddress() external view returns (address)
        function feeReceiver() external view returns (address)
        function routerFeeRate() external view returns (uint256)
        function routerFixedFee() external view returns (uint256)
        function feeRate() external view returns (uint256)
        function fixedFee() external view returns (uint256)
        function maxFeeRate() external view returns (uint256)
        function maxNativeFee() external view returns (uint256)
        function approved(address executor) external view returns (bool)
        function setAuthorization(address[] calldata executors, bool flag) external
        function setFee(address feeReceiver, uint256 feeRate, uint256 fixedFee) external
        function setBridgeAddress(address bridge) external
        function setMosAddress(address mos) external
        function setReferrerMaxFee(uint256 rate, uint256 native) external
        function setFeeManager(address manager) external
    ]"#
);

abigen!(
    IDeployFactory,
    r#"[
        function deploy(bytes32 salt, bytes creationCode, uint256 value) external
        function getAddress(bytes32 salt) external view returns (address)
    ]"#
);

abigen!(
    IContractDeployer,
    r#"[
        function create2(bytes32 salt, bytes32 bytecodeHash, bytes input) external payable returns (address)
    ]"#
);

lazy_static! {
    pub static ref ROUTER: BaseContract = BaseContract::from(IBUTTERROUTER_ABI.clone());
    pub static ref DEPLOY_FACTORY: BaseContract = BaseContract::from(IDEPLOYFACTORY_ABI.clone());
    pub static ref CONTRACT_DEPLOYER: BaseContract =
        BaseContract::from(ICONTRACTDEPLOYER_ABI.clone());
}
