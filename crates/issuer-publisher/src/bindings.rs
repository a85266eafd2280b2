use ethers::contract::abigen;

// `transitState` is the one entry point this workspace drives; the rest of
// the state transition contract's surface (getters, events) is read by
// other operators and isn't needed here.
abigen!(
    StateTransitionContract,
    r#"[
        function transitState(uint256 id, uint256 oldState, uint256 newState, bool isOldStateGenesis, uint256[2] a, uint256[2][2] b, uint256[2] c) external
    ]"#
);
