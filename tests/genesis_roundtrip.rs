//! Genesis export/import
//!
//! Exports a ledger with live tracking, records and metadata, reloads it
//! into a fresh ledger and checks the state and id counters carry over.

mod common;

#[cfg(test)]
mod genesis_tests {
    use super::common::*;
    use gas_rewards::rewards::RewardsMsg;
    use gas_rewards::{Coin, LedgerGenesis};

    fn populated_chain() -> Chain {
        let mut chain = Chain::new();
        let (a, b) = (addr(0xA0), addr(0xB0));
        let (owner, payer) = (addr(1), addr(3));
        chain.fund(&payer, 100_000);

        chain.begin_block(Some(10_000));
        chain.deploy(a, owner, Some(owner));
        chain.deploy(b, owner, Some(owner));
        chain
            .ledger
            .handle_msg(RewardsMsg::SetFlatFee {
                sender: owner,
                contract: a,
                flat_fee: Coin::new(DENOM, 7),
            })
            .unwrap();
        chain.end_block();

        for _ in 0..3 {
            chain.begin_block(Some(10_000));
            chain.ledger.on_inflation_minted(&Coin::new(DENOM, 1_000)).unwrap();
            chain.execute(payer, 1_000, 5_000, &[(a, 120), (b, 80)]);
            chain.end_block();
        }
        chain
    }

    #[test]
    fn test_export_import_is_identical() {
        let chain = populated_chain();
        let genesis = chain.ledger.export_genesis().unwrap();

        assert_eq!(genesis.tracking.tx_last_id, 3);
        assert_eq!(genesis.rewards.contracts_metadata.len(), 2);
        assert_eq!(genesis.rewards.flat_fees.len(), 1);
        assert!(genesis.rewards.min_consensus_fee.is_some());
        // a distribution record per contract per block, plus one flat fee
        // charge per tx
        assert_eq!(genesis.rewards.rewards_record_last_id, 9);

        let json = serde_json::to_string_pretty(&genesis).unwrap();
        let decoded: LedgerGenesis = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, genesis);

        let copy = Chain::new();
        copy.ledger.import_genesis(&decoded).unwrap();
        assert_eq!(copy.ledger.export_genesis().unwrap(), genesis);

        // importing twice changes nothing
        copy.ledger.import_genesis(&decoded).unwrap();
        assert_eq!(copy.ledger.export_genesis().unwrap(), genesis);
    }

    #[test]
    fn test_counters_continue_after_import() {
        let chain = populated_chain();
        let genesis = chain.ledger.export_genesis().unwrap();

        let mut copy = Chain::new();
        copy.ledger.import_genesis(&genesis).unwrap();
        copy.height = chain.height;

        let payer = addr(3);
        copy.fund(&payer, 10_000);
        copy.begin_block(None);
        let tx_id = copy.ledger.begin_transaction().unwrap();
        assert_eq!(tx_id, genesis.tracking.tx_last_id + 1);
        // contract b carries no flat fee, so its payout is the only new record
        let b = addr(0xB0);
        copy.ledger.deduct_fees(&contract_tx(payer, 100, 1_000, &[(b, 10)])).unwrap();
        copy.run_sessions(1_000, &[(b, 10)]);
        let outcome = copy.end_block();

        let record = outcome.distribution.contracts[&b].record.clone().unwrap();
        assert_eq!(record.id, genesis.rewards.rewards_record_last_id + 1);
    }

    #[test]
    fn test_invalid_genesis_is_rejected() {
        let chain = populated_chain();
        let mut genesis = chain.ledger.export_genesis().unwrap();
        genesis.rewards.rewards_record_last_id = 1;

        let copy = Chain::new();
        assert!(copy.ledger.import_genesis(&genesis).is_err());
    }
}
