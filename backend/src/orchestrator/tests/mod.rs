mod test_round_sequences;
